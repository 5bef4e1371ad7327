//! YUV4MPEG2 reading. Only 8-bit 4:2:0 streams are accepted, since that is what the frame pipeline consumes.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Seek, SeekFrom},
    num, str,
    path::{Path, PathBuf},
};

use dpi::PhysicalSize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{CaptureError, FrameLayout, FrameLease, FramePool, FrameSource};

const FILE_MAGICK: &[u8] = b"YUV4MPEG2 ";
const FRAME_MAGICK: &[u8] = b"FRAME";
const TERMINATOR: u8 = 0x0A;
const FIELD_SEP: u8 = b' ';
const RATIO_SEP: u8 = b':';

#[derive(Debug, Error)]
pub enum Y4mError {
    #[error("not a YUV4MPEG2 stream")]
    InvalidMagic,
    #[error("malformed frame header")]
    InvalidFrameHeader,
    #[error("invalid number in header: {0}")]
    Int(#[from] num::ParseIntError),
    #[error("header is not valid UTF-8: {0}")]
    Utf8(#[from] str::Utf8Error),
    #[error("malformed ratio in header")]
    Ratio,
    #[error("header does not specify a non-zero even frame size (got {width}x{height})")]
    Dimensions { width: u32, height: u32 },
    #[error("unsupported colorspace {0:?}, only 8-bit 4:2:0 is supported")]
    UnsupportedColorspace(String),
    #[error("a frame of {bytes} bytes exceeds the limit of {limit} bytes")]
    FrameTooLarge { bytes: usize, limit: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn parse_bytes(buf: &[u8]) -> Result<u32, Y4mError> {
    Ok(str::from_utf8(buf)?.parse()?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    pub num: u32,
    pub den: u32,
}

impl Ratio {
    pub fn new(num: u32, den: u32) -> Ratio {
        Ratio { num, den }
    }

    pub fn parse(value: &[u8]) -> Result<Ratio, Y4mError> {
        let mut parts = value.splitn(2, |&b| b == RATIO_SEP);
        let (Some(num), Some(den)) = (parts.next(), parts.next()) else {
            return Err(Y4mError::Ratio);
        };
        Ok(Ratio::new(parse_bytes(num)?, parse_bytes(den)?))
    }

    pub fn as_f64(&self) -> Option<f64> {
        (self.den != 0).then(|| self.num as f64 / self.den as f64)
    }
}

/// The 4:2:0 colorspace variants. They differ only in chroma siting, which a nearest-sampled preview ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    C420,
    C420jpeg,
    C420paldv,
    C420mpeg2,
}

impl Colorspace {
    fn parse(value: &[u8]) -> Result<Colorspace, Y4mError> {
        Ok(match value {
            b"420" => Colorspace::C420,
            b"420jpeg" => Colorspace::C420jpeg,
            b"420paldv" => Colorspace::C420paldv,
            b"420mpeg2" => Colorspace::C420mpeg2,
            _ => {
                return Err(Y4mError::UnsupportedColorspace(
                    String::from_utf8_lossy(value).into_owned(),
                ));
            }
        })
    }
}

/// Limits on the resources a [`Decoder`] is allowed to use.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    /// Maximum allowed size of a frame, default is 256 MiB.
    pub bytes: usize,
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub size: PhysicalSize<u32>,
    pub frame_rate: Ratio,
    pub pixel_aspect: Ratio,
    pub colorspace: Colorspace,
}

/// Synchronous YUV4MPEG2 decoder, reading frames straight into pooled buffers.
#[derive(Debug)]
pub struct Decoder<R> {
    reader: R,
    header: Header,
    /// Offset of the first frame, to rewind to.
    data_start: u64,
    params_buf: Vec<u8>,
}

impl<R: BufRead> Decoder<R> {
    pub fn new(reader: R) -> Result<Decoder<R>, Y4mError> {
        Decoder::new_with_limits(reader, Limits::default())
    }

    pub fn new_with_limits(mut reader: R, limits: Limits) -> Result<Decoder<R>, Y4mError> {
        let mut raw_params = Vec::new();
        let header_len = reader.read_until(TERMINATOR, &mut raw_params)?;
        if header_len < FILE_MAGICK.len() || !raw_params.starts_with(FILE_MAGICK) {
            return Err(Y4mError::InvalidMagic);
        }
        if raw_params.last() == Some(&TERMINATOR) {
            raw_params.pop();
        }

        let mut width = 0;
        let mut height = 0;
        // the frame rate is mandatory, but ffmpeg defaults it and so do we
        let mut frame_rate = Ratio::new(25, 1);
        let mut pixel_aspect = Ratio::new(1, 1);
        let mut colorspace = Colorspace::C420;
        // parameters are not converted to strings because their encoding is unspecified
        for param in raw_params[FILE_MAGICK.len()..].split(|&b| b == FIELD_SEP) {
            let Some((&name, value)) = param.split_first() else {
                continue;
            };
            match name {
                b'W' => width = parse_bytes(value)?,
                b'H' => height = parse_bytes(value)?,
                b'F' => frame_rate = Ratio::parse(value)?,
                b'A' => pixel_aspect = Ratio::parse(value)?,
                b'C' => colorspace = Colorspace::parse(value)?,
                _ => {}
            }
        }

        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(Y4mError::Dimensions { width, height });
        }

        let size = PhysicalSize::new(width, height);
        let bytes = FrameLayout::planar(size).buffer_lens.iter().sum();
        if bytes > limits.bytes {
            return Err(Y4mError::FrameTooLarge {
                bytes,
                limit: limits.bytes,
            });
        }

        Ok(Decoder {
            reader,
            header: Header {
                size,
                frame_rate,
                pixel_aspect,
                colorspace,
            },
            data_start: header_len as u64,
            params_buf: Vec::new(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Reads the next frame into `planes`, which must be sized for [`FrameLayout::planar`].
    ///
    /// Returns `false` at the end of the stream. A truncated last frame counts as the end of the stream.
    pub fn read_frame(&mut self, planes: &mut [Vec<u8>]) -> Result<bool, Y4mError> {
        self.params_buf.clear();
        self.reader.read_until(TERMINATOR, &mut self.params_buf)?;

        if self.params_buf.is_empty() {
            return Ok(false);
        }
        if self.params_buf.last() == Some(&TERMINATOR) {
            self.params_buf.pop();
        }

        // frame parameters are allowed, but not interpreted
        let Some(params) = self.params_buf.strip_prefix(FRAME_MAGICK) else {
            return Err(Y4mError::InvalidFrameHeader);
        };
        if params.first().is_some_and(|&b| b != FIELD_SEP) {
            return Err(Y4mError::InvalidFrameHeader);
        }

        for plane in planes {
            match self.reader.read_exact(plane) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("Truncated frame at the end of the stream");
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(true)
    }
}

impl<R: BufRead + Seek> Decoder<R> {
    /// Moves back to the first frame.
    pub fn rewind(&mut self) -> Result<(), Y4mError> {
        self.reader.seek(SeekFrom::Start(self.data_start))?;
        Ok(())
    }
}

/// Plays a YUV4MPEG2 stream as if it was a sensor, starting over when it runs out.
#[derive(Debug)]
pub struct Y4mSource<R = BufReader<File>> {
    name: String,
    decoder: Decoder<R>,
    layout: FrameLayout,
}

impl Y4mSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path: PathBuf = path.as_ref().to_owned();
        let file = File::open(&path)?;
        let source = Self::new(path.display().to_string(), BufReader::new(file))?;

        info!(
            "Opened {}: {}x{} at {:?} fps",
            source.name,
            source.layout.size.width,
            source.layout.size.height,
            source.decoder.header().frame_rate.as_f64()
        );

        Ok(source)
    }
}

impl<R: BufRead + Seek> Y4mSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Result<Self, CaptureError> {
        let decoder = Decoder::new(reader)?;
        let layout = FrameLayout::planar(decoder.header().size);

        Ok(Self {
            name: name.into(),
            decoder,
            layout,
        })
    }

    pub fn header(&self) -> &Header {
        self.decoder.header()
    }
}

impl<R: BufRead + Seek + Send> FrameSource for Y4mSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn frame_size(&self) -> PhysicalSize<u32> {
        self.layout.size
    }

    fn next_frame(&mut self, pool: &FramePool) -> Result<Option<FrameLease>, CaptureError> {
        let mut lease = pool.acquire(self.layout.clone())?;

        if self.decoder.read_frame(lease.buffers_mut())? {
            return Ok(Some(lease));
        }

        debug!("Reached the end of {}, starting over", self.name);
        self.decoder.rewind()?;
        if self.decoder.read_frame(lease.buffers_mut())? {
            Ok(Some(lease))
        } else {
            // not a single complete frame in the stream
            Ok(None)
        }
    }
}
