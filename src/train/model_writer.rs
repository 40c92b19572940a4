use std::convert::TryFrom;
use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2};

use crate::error::{Error, Result};
use crate::lstm::{BiLstm, LstmCell};
use crate::model::{
    CHUNK_LSTM, CHUNK_SCORER, CHUNK_TAG_EMBED, CHUNK_VOCAB, CHUNK_WORD_EMBED, MODEL_MAGIC,
    MODEL_TYPE, MODEL_VERSION,
};
use crate::parser::Parser;
use crate::scorer::EdgeScorer;
use crate::vocab::Vocabulary;

/// Write a trained parser model in the chunked binary format.
pub struct ModelWriter;

impl ModelWriter {
    /// Write model to file
    pub fn write(filename: &Path, parser: &Parser) -> Result<()> {
        let buf = Self::to_bytes(parser)?;
        fs::write(filename, buf)?;
        Ok(())
    }

    /// Serialize a parser to an in-memory model buffer.
    ///
    /// The layout is a fixed header followed by the vocabulary, embedding,
    /// encoder and scorer chunks; every integer is little-endian and the
    /// file size at offset 4 is backfilled once the buffer is complete.
    pub fn to_bytes(parser: &Parser) -> Result<Vec<u8>> {
        let config = parser.config();
        let vocab = parser.vocab();
        let params = &parser.params;

        let mut buf = Vec::new();
        buf.extend_from_slice(MODEL_MAGIC);
        put_u32(&mut buf, 0);
        buf.extend_from_slice(MODEL_TYPE);
        put_u32(&mut buf, MODEL_VERSION);
        put_len(&mut buf, vocab.num_words())?;
        put_len(&mut buf, vocab.num_tags())?;
        put_len(&mut buf, config.word_dim())?;
        put_len(&mut buf, config.tag_dim())?;
        put_len(&mut buf, config.hidden_dim())?;
        put_len(&mut buf, config.lstm_layers())?;
        put_len(&mut buf, config.scorer_hidden_dim())?;
        put_u32(&mut buf, config.word_dropout() as u32);
        put_f64(&mut buf, config.dropout_alpha());

        Self::write_vocab(&mut buf, vocab)?;
        Self::write_array2_chunk(&mut buf, CHUNK_WORD_EMBED, &params.embed.word)?;
        Self::write_array2_chunk(&mut buf, CHUNK_TAG_EMBED, &params.embed.tag)?;
        Self::write_lstm(&mut buf, &params.lstm)?;
        Self::write_scorer(&mut buf, &params.scorer)?;

        let file_size = u32::try_from(buf.len())
            .map_err(|_| Error::invalid_input("model exceeds the file format size limit"))?;
        buf[4..8].copy_from_slice(&file_size.to_le_bytes());
        Ok(buf)
    }

    fn write_vocab(buf: &mut Vec<u8>, vocab: &Vocabulary) -> Result<()> {
        let start = begin_chunk(buf, CHUNK_VOCAB);
        put_len(buf, vocab.num_words())?;
        for (word, count) in vocab.word_entries() {
            put_str(buf, word)?;
            put_u64(buf, count);
        }
        put_len(buf, vocab.num_tags())?;
        for tag in vocab.tag_entries() {
            put_str(buf, tag)?;
        }
        end_chunk(buf, start)
    }

    fn write_array2_chunk(buf: &mut Vec<u8>, tag: &[u8; 4], array: &Array2<f64>) -> Result<()> {
        let start = begin_chunk(buf, tag);
        put_array2(buf, array)?;
        end_chunk(buf, start)
    }

    fn write_lstm(buf: &mut Vec<u8>, lstm: &BiLstm) -> Result<()> {
        let start = begin_chunk(buf, CHUNK_LSTM);
        for layer in &lstm.layers {
            Self::write_cell(buf, &layer.fwd)?;
            Self::write_cell(buf, &layer.bwd)?;
        }
        end_chunk(buf, start)
    }

    fn write_cell(buf: &mut Vec<u8>, cell: &LstmCell) -> Result<()> {
        put_array2(buf, &cell.w_ih)?;
        put_array2(buf, &cell.w_hh)?;
        put_array1(buf, &cell.b_ih)?;
        put_array1(buf, &cell.b_hh)?;
        Ok(())
    }

    fn write_scorer(buf: &mut Vec<u8>, scorer: &EdgeScorer) -> Result<()> {
        let start = begin_chunk(buf, CHUNK_SCORER);
        put_array2(buf, &scorer.w_head)?;
        put_array2(buf, &scorer.w_mod)?;
        put_array1(buf, &scorer.b_hidden)?;
        put_array1(buf, &scorer.w_out)?;
        put_array1(buf, &scorer.b_out)?;
        end_chunk(buf, start)
    }
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_f64(buf: &mut Vec<u8>, value: f64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_len(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| Error::invalid_input("model component too large for the file format"))?;
    put_u32(buf, len);
    Ok(())
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    put_len(buf, s.len())?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_array1(buf: &mut Vec<u8>, array: &Array1<f64>) -> Result<()> {
    put_len(buf, array.len())?;
    for &value in array.iter() {
        put_f64(buf, value);
    }
    Ok(())
}

fn put_array2(buf: &mut Vec<u8>, array: &Array2<f64>) -> Result<()> {
    put_len(buf, array.nrows())?;
    put_len(buf, array.ncols())?;
    for &value in array.iter() {
        put_f64(buf, value);
    }
    Ok(())
}

/// Open a chunk: emit the tag plus a size placeholder, return the start
/// offset for [`end_chunk`].
fn begin_chunk(buf: &mut Vec<u8>, tag: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.extend_from_slice(tag);
    put_u32(buf, 0);
    start
}

/// Backfill the chunk size; the size counts the tag and size field too.
fn end_chunk(buf: &mut Vec<u8>, start: usize) -> Result<()> {
    let size = u32::try_from(buf.len() - start)
        .map_err(|_| Error::invalid_input("model chunk too large for the file format"))?;
    buf[start + 4..start + 8].copy_from_slice(&size.to_le_bytes());
    Ok(())
}
