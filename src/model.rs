use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use ndarray::{Array1, Array2};

use crate::embed::Embeddings;
use crate::error::{Error, Result};
use crate::lstm::{BiLstm, LstmCell, LstmLayer};
use crate::parser::{Parser, ParserConfig, ParserParams};
use crate::scorer::EdgeScorer;
use crate::vocab::Vocabulary;

pub(crate) const MODEL_MAGIC: &[u8; 4] = b"bDEP";
pub(crate) const MODEL_TYPE: &[u8; 4] = b"KGP1";
pub(crate) const MODEL_VERSION: u32 = 100;

pub(crate) const CHUNK_VOCAB: &[u8; 4] = b"VOCB";
pub(crate) const CHUNK_WORD_EMBED: &[u8; 4] = b"WEMB";
pub(crate) const CHUNK_TAG_EMBED: &[u8; 4] = b"TEMB";
pub(crate) const CHUNK_LSTM: &[u8; 4] = b"LSTM";
pub(crate) const CHUNK_SCORER: &[u8; 4] = b"SCOR";

#[derive(Debug, Clone)]
struct Header {
    magic: [u8; 4],
    size: u32,
    r#type: [u8; 4],
    version: u32,
    num_words: u32,
    num_tags: u32,
    word_dim: u32,
    tag_dim: u32,
    hidden_dim: u32,
    lstm_layers: u32,
    scorer_hidden_dim: u32,
    word_dropout: u32,
    dropout_alpha: f64,
}

/// A stored parser model.
///
/// Parses the whole buffer eagerly; any structural problem surfaces as
/// [`Error::InvalidModel`] instead of a later panic.
#[derive(Clone)]
pub struct Model {
    header: Header,
    config: ParserConfig,
    vocab: Vocabulary,
    params: ParserParams,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("header", &self.header)
            .field("num_words", &self.vocab.num_words())
            .field("num_tags", &self.vocab.num_tags())
            .finish()
    }
}

impl Model {
    /// Create an instance of a model object from a model in memory
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut reader = ModelReader::new(buf);
        let header = reader.read_header()?;
        if header.size as usize != buf.len() {
            return Err(Error::invalid_model(
                "stored file size disagrees with the data length",
            ));
        }

        let vocab = Self::read_vocab(&mut reader, &header)?;
        let config = ParserConfig::new()
            .with_word_dim(header.word_dim as usize)?
            .with_tag_dim(header.tag_dim as usize)?
            .with_hidden_dim(header.hidden_dim as usize)?
            .with_lstm_layers(header.lstm_layers as usize)?
            .with_scorer_hidden_dim(header.scorer_hidden_dim as usize)?
            .with_word_dropout(header.word_dropout != 0)
            .with_dropout_alpha(header.dropout_alpha)?;

        reader.expect_chunk(CHUNK_WORD_EMBED)?;
        let word = reader.read_array2_expect(
            vocab.num_words(),
            config.word_dim(),
            "word embedding table",
        )?;
        reader.expect_chunk(CHUNK_TAG_EMBED)?;
        let tag =
            reader.read_array2_expect(vocab.num_tags(), config.tag_dim(), "tag embedding table")?;

        reader.expect_chunk(CHUNK_LSTM)?;
        let hidden = config.hidden_dim();
        let mut layers = Vec::with_capacity(config.lstm_layers());
        for layer_idx in 0..config.lstm_layers() {
            let input_dim = if layer_idx == 0 {
                config.word_dim() + config.tag_dim()
            } else {
                2 * hidden
            };
            let fwd = reader.read_cell(input_dim, hidden)?;
            let bwd = reader.read_cell(input_dim, hidden)?;
            layers.push(LstmLayer { fwd, bwd });
        }

        reader.expect_chunk(CHUNK_SCORER)?;
        let scorer_hidden = config.scorer_hidden_dim();
        let w_head = reader.read_array2_expect(scorer_hidden, 2 * hidden, "scorer head weights")?;
        let w_mod = reader.read_array2_expect(scorer_hidden, 2 * hidden, "scorer modifier weights")?;
        let b_hidden = reader.read_array1_expect(scorer_hidden, "scorer hidden bias")?;
        let w_out = reader.read_array1_expect(scorer_hidden, "scorer output weights")?;
        let b_out = reader.read_array1_expect(1, "scorer output bias")?;

        if reader.remaining() != 0 {
            return Err(Error::invalid_model("trailing data after the final chunk"));
        }

        Ok(Self {
            header,
            config,
            vocab,
            params: ParserParams {
                embed: Embeddings { word, tag },
                lstm: BiLstm { layers },
                scorer: EdgeScorer {
                    w_head,
                    w_mod,
                    b_hidden,
                    w_out,
                    b_out,
                },
            },
        })
    }

    /// Read a model file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let buf = fs::read(path)?;
        Self::from_bytes(&buf)
    }

    fn read_vocab(reader: &mut ModelReader<'_>, header: &Header) -> Result<Vocabulary> {
        reader.expect_chunk(CHUNK_VOCAB)?;
        let num_words = reader.read_len()?;
        if num_words != header.num_words as usize {
            return Err(Error::invalid_model(
                "vocabulary chunk disagrees with the header word count",
            ));
        }
        let mut words = Vec::with_capacity(num_words);
        let mut word_counts = Vec::with_capacity(num_words);
        for _ in 0..num_words {
            words.push(reader.read_string()?);
            word_counts.push(reader.read_u64()?);
        }
        let num_tags = reader.read_len()?;
        if num_tags != header.num_tags as usize {
            return Err(Error::invalid_model(
                "vocabulary chunk disagrees with the header tag count",
            ));
        }
        let mut tags = Vec::with_capacity(num_tags);
        for _ in 0..num_tags {
            tags.push(reader.read_string()?);
        }
        Vocabulary::from_parts(words, word_counts, tags)
    }

    /// Number of words, reserved entries included
    pub fn num_words(&self) -> u32 {
        self.header.num_words
    }

    /// Number of tags, reserved entries included
    pub fn num_tags(&self) -> u32 {
        self.header.num_tags
    }

    /// Convert a word ID to its surface form
    pub fn to_word(&self, id: u32) -> Option<&str> {
        self.vocab.word(id)
    }

    /// Convert a word to its ID, without the unknown fallback
    pub fn to_word_id(&self, word: &str) -> Option<u32> {
        self.vocab.known_word(word)
    }

    /// Convert a tag ID to its surface form
    pub fn to_tag(&self, id: u32) -> Option<&str> {
        self.vocab.tag(id)
    }

    /// Convert a tag to its ID, without the unknown fallback
    pub fn to_tag_id(&self, tag: &str) -> Option<u32> {
        self.vocab.known_tag(tag)
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Turn the stored weights into a ready-to-use parser.
    pub fn into_parser(self) -> Result<Parser> {
        Parser::from_parts(self.config, self.vocab, self.params)
    }

    /// Print the model in human-readable format
    pub fn dump<W: Write>(&self, w: &mut W) -> Result<()> {
        let header = &self.header;
        writeln!(w, "FILEHEADER = {{")?;
        writeln!(w, "  magic: {}", String::from_utf8_lossy(&header.magic))?;
        writeln!(w, "  size: {}", header.size)?;
        writeln!(w, "  type: {}", String::from_utf8_lossy(&header.r#type))?;
        writeln!(w, "  version: {}", header.version)?;
        writeln!(w, "  num_words: {}", header.num_words)?;
        writeln!(w, "  num_tags: {}", header.num_tags)?;
        writeln!(w, "  word_dim: {}", header.word_dim)?;
        writeln!(w, "  tag_dim: {}", header.tag_dim)?;
        writeln!(w, "  hidden_dim: {}", header.hidden_dim)?;
        writeln!(w, "  lstm_layers: {}", header.lstm_layers)?;
        writeln!(w, "  scorer_hidden_dim: {}", header.scorer_hidden_dim)?;
        writeln!(w, "  word_dropout: {}", header.word_dropout != 0)?;
        writeln!(w, "  dropout_alpha: {}", header.dropout_alpha)?;
        writeln!(w, "}}\n")?;
        writeln!(w, "WORDS = {{")?;
        for id in 0..header.num_words {
            if let Some(word) = self.vocab.word(id) {
                writeln!(
                    w,
                    "  {:>5}: {} ({})",
                    id,
                    word,
                    self.vocab.word_frequency(id)
                )?;
            }
        }
        writeln!(w, "}}\n")?;
        writeln!(w, "TAGS = {{")?;
        for id in 0..header.num_tags {
            if let Some(tag) = self.vocab.tag(id) {
                writeln!(w, "  {:>5}: {}", id, tag)?;
            }
        }
        writeln!(w, "}}\n")?;
        Ok(())
    }
}

/// Sequential little-endian reader over a model buffer.
struct ModelReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ModelReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::invalid_model("unexpected end of model data"));
        }
        let slice = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn read_tag(&mut self) -> Result<[u8; 4]> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_len(&mut self) -> Result<usize> {
        Ok(self.read_u32()? as usize)
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::invalid_model("vocabulary entry is not valid UTF-8"))
    }

    fn read_header(&mut self) -> Result<Header> {
        let magic = self.read_tag()?;
        if &magic != MODEL_MAGIC {
            return Err(Error::invalid_model("invalid file format, magic mismatch"));
        }
        let size = self.read_u32()?;
        let r#type = self.read_tag()?;
        if &r#type != MODEL_TYPE {
            return Err(Error::invalid_model("unsupported model type"));
        }
        let version = self.read_u32()?;
        if version != MODEL_VERSION {
            return Err(Error::invalid_model(format!(
                "unsupported model version {}",
                version
            )));
        }
        let num_words = self.read_u32()?;
        let num_tags = self.read_u32()?;
        let word_dim = self.read_u32()?;
        let tag_dim = self.read_u32()?;
        let hidden_dim = self.read_u32()?;
        let lstm_layers = self.read_u32()?;
        let scorer_hidden_dim = self.read_u32()?;
        let word_dropout = self.read_u32()?;
        let dropout_alpha = self.read_f64()?;
        if num_words < 2 || num_tags < 2 {
            return Err(Error::invalid_model(
                "header misses the reserved vocabulary entries",
            ));
        }
        if word_dim == 0
            || tag_dim == 0
            || hidden_dim == 0
            || lstm_layers == 0
            || scorer_hidden_dim == 0
        {
            return Err(Error::invalid_model("header contains zero dimensions"));
        }
        if !dropout_alpha.is_finite() || dropout_alpha < 0.0 {
            return Err(Error::invalid_model("header dropout alpha is invalid"));
        }
        Ok(Header {
            magic,
            size,
            r#type,
            version,
            num_words,
            num_tags,
            word_dim,
            tag_dim,
            hidden_dim,
            lstm_layers,
            scorer_hidden_dim,
            word_dropout,
            dropout_alpha,
        })
    }

    fn expect_chunk(&mut self, tag: &[u8; 4]) -> Result<()> {
        let start = self.pos;
        let found = self.read_tag()?;
        if &found != tag {
            return Err(Error::invalid_model(format!(
                "expected {} chunk, found {}",
                String::from_utf8_lossy(tag),
                String::from_utf8_lossy(&found)
            )));
        }
        let size = self.read_u32()? as usize;
        if size < 8 || start + size > self.buf.len() {
            return Err(Error::invalid_model(format!(
                "{} chunk size is out of bounds",
                String::from_utf8_lossy(tag)
            )));
        }
        Ok(())
    }

    fn read_array1(&mut self) -> Result<Array1<f64>> {
        let len = self.read_len()?;
        Ok(Array1::from_vec(self.read_values(len)?))
    }

    fn read_array2(&mut self) -> Result<Array2<f64>> {
        let rows = self.read_len()?;
        let cols = self.read_len()?;
        let count = rows
            .checked_mul(cols)
            .ok_or_else(|| Error::invalid_model("array dimensions overflow"))?;
        Array2::from_shape_vec((rows, cols), self.read_values(count)?)
            .map_err(|_| Error::invalid_model("array shape mismatch"))
    }

    fn read_values(&mut self, count: usize) -> Result<Vec<f64>> {
        let byte_len = count
            .checked_mul(8)
            .ok_or_else(|| Error::invalid_model("array dimensions overflow"))?;
        let bytes = self.take(byte_len)?;
        Ok(bytes
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect())
    }

    fn read_array1_expect(&mut self, len: usize, what: &str) -> Result<Array1<f64>> {
        let array = self.read_array1()?;
        if array.len() != len {
            return Err(Error::invalid_model(format!(
                "{} must have {} entries, got {}",
                what,
                len,
                array.len()
            )));
        }
        Ok(array)
    }

    fn read_array2_expect(&mut self, rows: usize, cols: usize, what: &str) -> Result<Array2<f64>> {
        let array = self.read_array2()?;
        if array.dim() != (rows, cols) {
            return Err(Error::invalid_model(format!(
                "{} must be {} x {}, got {} x {}",
                what,
                rows,
                cols,
                array.nrows(),
                array.ncols()
            )));
        }
        Ok(array)
    }

    fn read_cell(&mut self, input_dim: usize, hidden_dim: usize) -> Result<LstmCell> {
        let w_ih = self.read_array2_expect(4 * hidden_dim, input_dim, "encoder input weights")?;
        let w_hh =
            self.read_array2_expect(4 * hidden_dim, hidden_dim, "encoder recurrent weights")?;
        let b_ih = self.read_array1_expect(4 * hidden_dim, "encoder input bias")?;
        let b_hh = self.read_array1_expect(4 * hidden_dim, "encoder recurrent bias")?;
        Ok(LstmCell {
            w_ih,
            w_hh,
            b_ih,
            b_hh,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::model_writer::ModelWriter;

    fn trained_fixture() -> Parser {
        let mut vocab = Vocabulary::new();
        for word in ["the", "dog", "barks"] {
            vocab.intern_word(word);
        }
        for tag in ["DT", "NN", "VB"] {
            vocab.intern_tag(tag);
        }
        let config = ParserConfig::new()
            .with_word_dim(3)
            .unwrap()
            .with_tag_dim(2)
            .unwrap()
            .with_lstm_layers(2)
            .unwrap()
            .with_scorer_hidden_dim(3)
            .unwrap()
            .with_word_dropout(false)
            .with_seed(11);
        Parser::new(config, vocab).unwrap()
    }

    #[test]
    fn test_model_round_trip() {
        let parser = trained_fixture();
        let buf = ModelWriter::to_bytes(&parser).unwrap();

        let model = Model::from_bytes(&buf).unwrap();
        assert_eq!(model.header.version, 100);
        assert_eq!(model.num_words(), 5);
        assert_eq!(model.num_tags(), 5);
        assert_eq!(model.to_word(2), Some("the"));
        assert_eq!(model.to_word_id("dog"), Some(3));
        assert_eq!(model.to_tag_id("missing"), None);

        let words = [0, 2, 3, 4];
        let tags = [0, 2, 3, 4];
        let expected = parser.parse(&words, &tags).unwrap();
        let restored = model.into_parser().unwrap();
        assert_eq!(restored.parse(&words, &tags).unwrap(), expected);
    }

    #[test]
    fn test_invalid_model() {
        let buf = b"";
        assert!(Model::from_bytes(buf).is_err());

        let parser = trained_fixture();
        let mut buf = ModelWriter::to_bytes(&parser).unwrap();
        buf[0] = b'B'; // change magic from bDEP to BDEP
        let err = Model::from_bytes(&buf).unwrap_err();
        assert!(matches!(err, Error::InvalidModel(_)));
    }

    #[test]
    fn test_truncated_model() {
        let parser = trained_fixture();
        let buf = ModelWriter::to_bytes(&parser).unwrap();
        let half = &buf[..buf.len() / 2];
        let err = Model::from_bytes(half).unwrap_err();
        assert!(matches!(err, Error::InvalidModel(_)));
    }

    #[test]
    fn test_unsupported_version() {
        let parser = trained_fixture();
        let mut buf = ModelWriter::to_bytes(&parser).unwrap();
        buf[12..16].copy_from_slice(&999u32.to_le_bytes());
        let err = Model::from_bytes(&buf).unwrap_err();
        assert!(matches!(err, Error::InvalidModel(_)));
    }

    #[test]
    fn test_model_dump() {
        let parser = trained_fixture();
        let buf = ModelWriter::to_bytes(&parser).unwrap();
        let model = Model::from_bytes(&buf).unwrap();
        let mut out = Vec::new();
        model.dump(&mut out).unwrap();
        let out_str = std::str::from_utf8(&out).unwrap();
        assert!(out_str.contains("magic: bDEP"));
        assert!(out_str.contains("type: KGP1"));
        assert!(out_str.contains("2: the (1)"));
        assert!(out_str.contains("4: VB"));
    }
}
