use anyhow::{Context, Result};
use std::marker::PhantomData;

/// A fallible conversion step of a record decoding pipeline.
///
/// Steps compose with [`Transform::then`] when their types are known
/// statically, or through [`Compose`] when the list of steps comes from a
/// configuration.
///
/// Note: `then()` works only when:
/// 1. **Types align**: `self: Transform<I, O>`, `next: Transform<O, M>`
/// 2. **Owned**: `Self::Sized`
/// 3. **Thread-safe**: intermediate and output types must be `Send`
pub trait Transform<I, O>: Send + Sync {
    fn apply(&self, input: I) -> Result<O>;

    #[inline]
    fn then<T, M>(self, next: T) -> Chain<Self, T, O>
    where
        Self: Sized,
        T: Transform<O, M>,
        O: Send,
        M: Send,
    {
        Chain {
            first: self,
            second: next,
            _marker: PhantomData,
        }
    }
}

impl<I, O> Transform<I, O> for Box<dyn Transform<I, O>> {
    fn apply(&self, input: I) -> Result<O> {
        self.as_ref().apply(input)
    }
}

/// A chain of two transforms (`A` -> `B`)
/// - `PhantomData<M>` enforces intermediate type alignment.
#[derive(Debug)]
pub struct Chain<A, B, M> {
    first: A,
    second: B,
    _marker: PhantomData<fn() -> M>,
}

impl<A, B, M> Chain<A, B, M> {
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            _marker: PhantomData,
        }
    }
}

impl<I, M, O, A, B> Transform<I, O> for Chain<A, B, M>
where
    A: Transform<I, M>,
    B: Transform<M, O>,
    M: Send,
{
    fn apply(&self, input: I) -> Result<O> {
        self.first
            .apply(input)
            .and_then(|mid| self.second.apply(mid))
            .with_context(|| {
                format!(
                    "Transform chain failed: {} → {} → {}",
                    std::any::type_name::<A>(),
                    std::any::type_name::<B>(),
                    std::any::type_name::<O>()
                )
            })
    }
}

/// Same-typed steps applied in list order. An empty list is the identity.
pub struct Compose<T> {
    steps: Vec<Box<dyn Transform<T, T>>>,
}

impl<T> Compose<T> {
    pub fn new(steps: Vec<Box<dyn Transform<T, T>>>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<T: Send> Transform<T, T> for Compose<T> {
    fn apply(&self, input: T) -> Result<T> {
        self.steps
            .iter()
            .enumerate()
            .try_fold(input, |value, (index, step)| {
                step.apply(value)
                    .with_context(|| format!("Transform step #{} failed", index))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct AddOne;
    impl Transform<u32, u32> for AddOne {
        fn apply(&self, input: u32) -> Result<u32> {
            Ok(input + 1)
        }
    }

    struct Describe;
    impl Transform<u32, String> for Describe {
        fn apply(&self, input: u32) -> Result<String> {
            Ok(format!("record {}", input))
        }
    }

    struct Fail;
    impl Transform<u32, u32> for Fail {
        fn apply(&self, _: u32) -> Result<u32> {
            Err(anyhow!("decode failed"))
        }
    }

    #[test]
    fn test_then_composes_in_order() -> Result<()> {
        let pipeline = AddOne.then(AddOne).then(Describe);
        assert_eq!(pipeline.apply(1)?, "record 3");
        Ok(())
    }

    #[test]
    fn test_compose_runs_boxed_steps() -> Result<()> {
        let steps: Vec<Box<dyn Transform<u32, u32>>> = vec![Box::new(AddOne), Box::new(AddOne)];
        let compose = Compose::new(steps);
        assert_eq!(compose.len(), 2);
        assert_eq!(compose.apply(0)?, 2);
        assert_eq!(Compose::<u32>::new(Vec::new()).apply(9)?, 9);
        Ok(())
    }

    #[test]
    fn test_errors_carry_context() {
        let chain = Chain::new(AddOne, Fail);
        let msg = chain.apply(0).unwrap_err().to_string();
        assert!(msg.contains("Transform chain failed"));
        assert!(msg.contains("Fail"));

        let steps: Vec<Box<dyn Transform<u32, u32>>> = vec![Box::new(AddOne), Box::new(Fail)];
        let err = Compose::new(steps).apply(0).unwrap_err();
        assert!(err.to_string().contains("step #1"));
    }
}
