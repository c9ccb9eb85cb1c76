//! Dataset snapshot: a zstd-compressed, self-describing JSON encoding of
//! the whole model. Spatial indices are not persisted; they are rebuilt
//! on load.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::model::Dataset;
use crate::Error;

const COMPRESSION_LEVEL: i32 = 3;

pub fn save(data: &Dataset, path: &Path) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut encoder = zstd::stream::write::Encoder::new(BufWriter::new(file), COMPRESSION_LEVEL)?;
    serde_json::to_writer(&mut encoder, data)?;
    let buffered = encoder.finish()?;
    buffered.into_inner().map_err(|e| e.into_error())?;
    log::info!("wrote dataset snapshot to {}", path.display());
    Ok(())
}

pub fn load(path: &Path) -> Result<Dataset, Error> {
    let file = File::open(path)?;
    let decoder = zstd::stream::read::Decoder::new(BufReader::new(file))?;
    let mut data: Dataset = serde_json::from_reader(decoder)?;
    data.rebuild_vertex_trees();
    data.validate()?;
    data.log_stats();
    Ok(data)
}
