//! Sample and pixel conversions between capture devices and encoder input

use crate::errors::{EncoderError, Result};
use crate::types::SampleFormat;

use super::CaptureFeed;

/// Write interleaved float samples into `out` in `format`.
///
/// `out` must hold exactly `interleaved.len() * bytes_per_sample` bytes.
/// Planar formats are written one channel plane after another.
pub fn write_samples(
    interleaved: &[f32],
    channels: usize,
    format: SampleFormat,
    out: &mut [u8],
) -> Result<()> {
    let bps = format.bytes_per_sample();
    let expected = interleaved.len() * bps;
    if channels == 0 || out.len() != expected || interleaved.len() % channels != 0 {
        return Err(EncoderError::FrameSize {
            expected,
            actual: out.len(),
        });
    }

    let frames = interleaved.len() / channels;
    for (i, &sample) in interleaved.iter().enumerate() {
        let slot = if format.is_planar() {
            let channel = i % channels;
            let index = i / channels;
            channel * frames + index
        } else {
            i
        };
        encode_sample(sample, format, &mut out[slot * bps..(slot + 1) * bps]);
    }
    Ok(())
}

fn encode_sample(sample: f32, format: SampleFormat, out: &mut [u8]) {
    let s = sample.clamp(-1.0, 1.0);
    match format {
        SampleFormat::U8 => out[0] = (s * 127.0 + 128.0).round() as u8,
        SampleFormat::S16 | SampleFormat::S16p => {
            out.copy_from_slice(&((s * i16::MAX as f32) as i16).to_le_bytes())
        }
        SampleFormat::S32 | SampleFormat::S32p => {
            out.copy_from_slice(&((s as f64 * i32::MAX as f64) as i32).to_le_bytes())
        }
        SampleFormat::F32 | SampleFormat::F32p => out.copy_from_slice(&s.to_le_bytes()),
        SampleFormat::F64 | SampleFormat::F64p => {
            out.copy_from_slice(&(s as f64).to_le_bytes())
        }
    }
}

/// Convert packed YUYV 4:2:2 into planar I420.
///
/// Chroma from each pair of rows is averaged. `width` and `height` must be
/// even.
pub fn yuyv422_to_yuv420(src: &[u8], dst: &mut [u8], width: usize, height: usize) -> Result<()> {
    let src_len = width * height * 2;
    let dst_len = width * height * 3 / 2;
    if src.len() != src_len {
        return Err(EncoderError::FrameSize {
            expected: src_len,
            actual: src.len(),
        });
    }
    if dst.len() != dst_len || width % 2 != 0 || height % 2 != 0 {
        return Err(EncoderError::FrameSize {
            expected: dst_len,
            actual: dst.len(),
        });
    }

    let (y_plane, chroma) = dst.split_at_mut(width * height);
    let (u_plane, v_plane) = chroma.split_at_mut(width * height / 4);
    let stride = width * 2;

    for (row, line) in src.chunks_exact(stride).enumerate() {
        for (x, luma) in y_plane[row * width..(row + 1) * width].iter_mut().enumerate() {
            *luma = line[x * 2];
        }
    }

    for cy in 0..height / 2 {
        let top = &src[(cy * 2) * stride..(cy * 2 + 1) * stride];
        let bottom = &src[(cy * 2 + 1) * stride..(cy * 2 + 2) * stride];
        for cx in 0..width / 2 {
            let i = cx * 4;
            let dst_index = cy * (width / 2) + cx;
            u_plane[dst_index] = ((top[i + 1] as u16 + bottom[i + 1] as u16 + 1) / 2) as u8;
            v_plane[dst_index] = ((top[i + 3] as u16 + bottom[i + 3] as u16 + 1) / 2) as u8;
        }
    }
    Ok(())
}

/// Adapts a YUYV 4:2:2 source (e.g. a webcam) to I420 frames
pub struct Yuyv422Feed<F> {
    inner: F,
    width: usize,
    height: usize,
    packed: Vec<u8>,
}

impl<F: CaptureFeed> Yuyv422Feed<F> {
    pub fn new(inner: F, width: u32, height: u32) -> Self {
        let (width, height) = (width as usize, height as usize);
        Self {
            inner,
            width,
            height,
            packed: vec![0; width * height * 2],
        }
    }
}

impl<F: CaptureFeed> CaptureFeed for Yuyv422Feed<F> {
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool> {
        if !self.inner.read_frame(&mut self.packed)? {
            return Ok(false);
        }
        yuyv422_to_yuv420(&self.packed, frame, self.width, self.height)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RawReader;
    use std::io::Cursor;

    #[test]
    fn test_interleaved_s16() {
        let mut out = [0u8; 8];
        write_samples(&[1.0, -1.0, 0.0, 0.5], 2, SampleFormat::S16, &mut out).unwrap();
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), -i16::MAX);
        assert_eq!(i16::from_le_bytes([out[4], out[5]]), 0);
        assert_eq!(i16::from_le_bytes([out[6], out[7]]), 16383);
    }

    #[test]
    fn test_planar_groups_channels() {
        let mut out = [0u8; 16];
        write_samples(&[0.1, 0.2, 0.3, 0.4], 2, SampleFormat::F32p, &mut out).unwrap();
        let read = |i: usize| f32::from_le_bytes(out[i * 4..i * 4 + 4].try_into().unwrap());
        assert_eq!([read(0), read(1), read(2), read(3)], [0.1, 0.3, 0.2, 0.4]);
    }

    #[test]
    fn test_size_mismatch() {
        let mut out = [0u8; 3];
        assert!(write_samples(&[0.0, 0.0], 2, SampleFormat::S16, &mut out).is_err());
    }

    #[test]
    fn test_yuyv_to_i420() {
        // 2x2 image: Y0 U Y1 V per row
        let src = [10, 100, 20, 200, 30, 110, 40, 210];
        let mut dst = [0u8; 6];
        yuyv422_to_yuv420(&src, &mut dst, 2, 2).unwrap();
        assert_eq!(dst, [10, 20, 30, 40, 105, 205]);
    }

    #[test]
    fn test_yuyv_feed_converts_each_frame() {
        let src = vec![10, 100, 20, 200, 30, 110, 40, 210];
        let mut feed = Yuyv422Feed::new(RawReader::new(Cursor::new(src)), 2, 2);
        let mut frame = [0u8; 6];
        assert!(feed.read_frame(&mut frame).unwrap());
        assert_eq!(frame[4..], [105, 205]);
        assert!(!feed.read_frame(&mut frame).unwrap());
    }
}
