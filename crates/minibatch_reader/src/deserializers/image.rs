//! src/deserializers/image.rs
//!
//! Image map files: one `<path>\t<class id>` record per line. Every record is
//! a sequence of length one. Feature streams decode the image through their
//! own transform pipeline into `[1, C, H, W]`; label streams emit the class
//! as a `[1, label_dim]` one-hot row.

use super::pool::{serve, WorkerPool};
use super::{DataDeserializer, ReadContext};
use crate::config::{ImageDeserializerConfig, ImageStream};
use crate::error::ReaderError;
use crate::rng::init_record_rng;
use crate::stream::{ElementType, StorageFormat, StreamInfo};
use crate::transforms::vision::{build_pipeline, output_shape, ImagePipeline};
use crate::transforms::Transform;
use anyhow::{Context, Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tch::Tensor;

#[derive(Debug, Clone, PartialEq)]
struct ImageRecord {
    path: PathBuf,
    class_id: usize,
}

enum StreamDecoder {
    Feature(usize),
    Label(usize),
}

struct DecodeTask {
    slot: usize,
    pipeline: usize,
    record: usize,
    path: PathBuf,
    context: ReadContext,
}

type DecodeOutput = (usize, Result<Tensor>);

pub struct ImageDeserializer {
    streams: Vec<StreamInfo>,
    decoders: Vec<StreamDecoder>,
    pipelines: Arc<Vec<ImagePipeline>>,
    records: Vec<ImageRecord>,
    pool: Option<WorkerPool<DecodeTask, DecodeOutput>>,
}

impl ImageDeserializer {
    pub fn open(config: &ImageDeserializerConfig) -> Result<Self> {
        let text = std::fs::read_to_string(&config.file)
            .with_context(|| format!("Failed to read {}", config.file.display()))?;
        let base_dir = config.file.parent().unwrap_or_else(|| Path::new("."));
        let records = parse_map(&text, base_dir)?;

        let mut streams = Vec::with_capacity(config.input.len());
        let mut decoders = Vec::with_capacity(config.input.len());
        let mut pipelines = Vec::new();

        for (id, (name, stream)) in config.input.iter().enumerate() {
            let (dimension, sample_shape) = match stream {
                ImageStream::Feature { transforms } => {
                    decoders.push(StreamDecoder::Feature(pipelines.len()));
                    pipelines.push(build_pipeline(transforms, base_dir)?);
                    let shape = output_shape(transforms).unwrap_or_default();
                    let dimension =
                        (!shape.is_empty()).then(|| shape.iter().product::<i64>() as usize);
                    (dimension, shape)
                }
                ImageStream::Label { label_dim } => {
                    if let Some(record) = records.iter().find(|r| r.class_id >= *label_dim) {
                        return Err(Error::new(ReaderError::format(format!(
                            "class id {} of '{}' is out of range for labelDim {}",
                            record.class_id,
                            record.path.display(),
                            label_dim
                        ))));
                    }
                    decoders.push(StreamDecoder::Label(*label_dim));
                    (Some(*label_dim), vec![*label_dim as i64])
                }
            };
            streams.push(StreamInfo {
                id,
                name: name.to_string(),
                storage: StorageFormat::Dense,
                element_type: ElementType::Float32,
                dimension,
                sample_shape,
            });
        }

        let pipelines = Arc::new(pipelines);
        let mut pool: Option<WorkerPool<DecodeTask, DecodeOutput>> = None;
        if config.decode_workers > 0 && !pipelines.is_empty() {
            let shared = pipelines.clone();
            pool = Some(WorkerPool::new(
                config.decode_workers,
                config.decode_workers * 2,
                move |rx, tx, shutdown| {
                    serve(rx, tx, shutdown, |task: DecodeTask| {
                        (task.slot, decode(&shared[task.pipeline], &task))
                    })
                },
            )?);
        }

        Ok(Self {
            streams,
            decoders,
            pipelines,
            records,
            pool,
        })
    }

    fn record(&self, index: usize) -> Result<&ImageRecord> {
        self.records.get(index).ok_or_else(|| {
            Error::new(ReaderError::lookup(format!(
                "record {} out of range ({} records)",
                index,
                self.records.len()
            )))
        })
    }

    fn decode_features(
        &self,
        pipeline: usize,
        indices: &[usize],
        context: ReadContext,
    ) -> Result<Vec<Tensor>> {
        let tasks = indices
            .iter()
            .enumerate()
            .map(|(slot, &record)| {
                Ok(DecodeTask {
                    slot,
                    pipeline,
                    record,
                    path: self.record(record)?.path.clone(),
                    context,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let Some(pool) = &self.pool else {
            return tasks
                .iter()
                .map(|task| decode(&self.pipelines[pipeline], task))
                .collect();
        };

        let mut decoded: Vec<Option<Tensor>> = (0..tasks.len()).map(|_| None).collect();
        for (slot, result) in pool.run(tasks)? {
            decoded[slot] = Some(result?);
        }
        decoded
            .into_iter()
            .map(|tensor| tensor.context("Decode worker dropped a record"))
            .collect()
    }
}

fn decode(pipeline: &ImagePipeline, task: &DecodeTask) -> Result<Tensor> {
    init_record_rng(task.context.seed, task.context.sweep, task.record);
    let image = pipeline
        .apply(task.path.clone())
        .with_context(|| format!("Failed to decode record {}", task.record))?;
    Ok(image.unsqueeze(0))
}

fn parse_map(text: &str, base_dir: &Path) -> Result<Vec<ImageRecord>> {
    let mut records = Vec::new();
    for (line_index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = || {
            Error::new(ReaderError::format(format!(
                "line {}: expected '<path>\\t<class id>' but got '{}'",
                line_index + 1,
                line
            )))
        };
        let (path, class_id) = line.rsplit_once(char::is_whitespace).ok_or_else(malformed)?;
        let class_id = class_id.parse::<usize>().map_err(|_| malformed())?;
        let path = Path::new(path.trim());
        records.push(ImageRecord {
            path: if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            },
            class_id,
        });
    }
    Ok(records)
}

fn one_hot(class_id: usize, label_dim: usize) -> Tensor {
    let mut row = vec![0.0f32; label_dim];
    row[class_id] = 1.0;
    Tensor::from_slice(&row).reshape(&[1, label_dim as i64])
}

impl DataDeserializer for ImageDeserializer {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn sequence_count(&self) -> usize {
        self.records.len()
    }

    fn sequence_length(&self, index: usize) -> usize {
        usize::from(index < self.records.len())
    }

    fn read_sequences(&self, indices: &[usize], context: ReadContext) -> Result<Vec<Vec<Tensor>>> {
        self.decoders
            .iter()
            .map(|decoder| match decoder {
                StreamDecoder::Feature(pipeline) => self.decode_features(*pipeline, indices, context),
                StreamDecoder::Label(label_dim) => indices
                    .iter()
                    .map(|&index| Ok(one_hot(self.record(index)?.class_id, *label_dim)))
                    .collect(),
            })
            .collect()
    }
}

impl std::fmt::Debug for ImageDeserializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageDeserializer")
            .field("streams", &self.streams)
            .field("records", &self.records.len())
            .field("decode_workers", &self.pool.as_ref().map_or(0, |p| p.num_workers()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CropRatio, CropType, DeserializerConfig, ImageDeserializerBuilder, ImageTransform,
        Interpolation, JitterType,
    };
    use image::{Rgb, RgbImage};

    fn write_dataset(dir: &Path, count: usize) -> Result<PathBuf> {
        let mut map = String::new();
        for i in 0..count {
            let name = format!("img{}.png", i);
            let img = RgbImage::from_pixel(12 + i as u32, 10, Rgb([i as u8 * 10, 0, 0]));
            img.save(dir.join(&name))?;
            map.push_str(&format!("{}\t{}\n", name, i % 3));
        }
        let map_path = dir.join("map.txt");
        std::fs::write(&map_path, map)?;
        Ok(map_path)
    }

    fn image_config(
        map: &Path,
        workers: usize,
        transforms: Vec<ImageTransform>,
    ) -> Result<ImageDeserializerConfig> {
        match ImageDeserializerBuilder::new(map)
            .map_features("features", transforms)
            .map_labels("labels", 3)
            .decode_workers(workers)
            .build()?
        {
            DeserializerConfig::Image(config) => Ok(config),
            other => anyhow::bail!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_parse_map_resolves_relative_paths() -> Result<()> {
        let records = parse_map("a.png\t1\n\n/abs/b.jpg 2\n", Path::new("/data"))?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, PathBuf::from("/data/a.png"));
        assert_eq!(records[1].path, PathBuf::from("/abs/b.jpg"));
        assert_eq!(records[1].class_id, 2);

        let err = parse_map("a.png\tcat\n", Path::new(".")).unwrap_err();
        assert!(matches!(ReaderError::of(&err), Some(ReaderError::Format(_))));
        Ok(())
    }

    #[test]
    fn test_reads_features_and_one_hot_labels() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let map = write_dataset(dir.path(), 4)?;
        let transforms = vec![ImageTransform::scale(6, 4, 3, Interpolation::Linear)?];
        let reader = ImageDeserializer::open(&image_config(&map, 0, transforms)?)?;

        assert_eq!(reader.sequence_count(), 4);
        assert_eq!(reader.sequence_length(2), 1);
        assert_eq!(reader.streams()[0].sample_shape, vec![3, 4, 6]);
        assert_eq!(reader.streams()[0].dimension, Some(72));
        assert_eq!(reader.streams()[1].sample_shape, vec![3]);

        let read = reader.read_sequences(&[2, 0], ReadContext::default())?;
        assert_eq!(read[0][0].size(), vec![1, 3, 4, 6]);
        assert_eq!(read[0][0].double_value(&[0, 0, 0, 0]), 20.0);
        assert_eq!(read[1][0].size(), vec![1, 3]);
        assert_eq!(read[1][0].double_value(&[0, 2]), 1.0);
        assert_eq!(read[1][1].double_value(&[0, 0]), 1.0);
        Ok(())
    }

    #[test]
    fn test_worker_pool_matches_inline_decoding() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let map = write_dataset(dir.path(), 6)?;
        let transforms = vec![
            ImageTransform::crop(
                CropType::Random,
                CropRatio::parse("0.5:1.0")?,
                JitterType::UniRatio,
            )?,
            ImageTransform::scale(5, 5, 3, Interpolation::Nearest)?,
        ];
        let inline = ImageDeserializer::open(&image_config(&map, 0, transforms.clone())?)?;
        let pooled = ImageDeserializer::open(&image_config(&map, 3, transforms)?)?;

        let context = ReadContext { seed: 7, sweep: 1 };
        let indices = [5, 1, 3, 0, 2, 4];
        let a = inline.read_sequences(&indices, context)?;
        let b = pooled.read_sequences(&indices, context)?;
        for (x, y) in a[0].iter().zip(&b[0]) {
            assert!(x.equal(y));
        }
        Ok(())
    }

    #[test]
    fn test_class_id_out_of_range() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let map = write_dataset(dir.path(), 1)?;
        std::fs::write(&map, "img0.png\t5\n")?;
        let err = ImageDeserializer::open(&image_config(&map, 0, Vec::new())?).unwrap_err();
        assert!(matches!(ReaderError::of(&err), Some(ReaderError::Format(_))));
        Ok(())
    }

    #[test]
    fn test_missing_image_fails_read() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let map = dir.path().join("map.txt");
        std::fs::write(&map, "nope.png\t0\n")?;
        let reader = ImageDeserializer::open(&image_config(&map, 0, Vec::new())?)?;
        assert!(reader.read_sequences(&[0], ReadContext::default()).is_err());
        Ok(())
    }
}
