//! Media vocabulary shared by the negotiator, the session, and the framer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Kind of elementary stream a session produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Audio,
    Video,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Audio => write!(f, "audio"),
            MediaType::Video => write!(f, "video"),
        }
    }
}

/// Audio sample formats
///
/// Interleaved formats carry all channels in one plane; the `*p` variants
/// carry one plane per channel, concatenated in channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
    F64,
    S16p,
    S32p,
    F32p,
    F64p,
}

impl SampleFormat {
    /// Bytes occupied by one sample of one channel
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 | Self::S16p => 2,
            Self::S32 | Self::S32p | Self::F32 | Self::F32p => 4,
            Self::F64 | Self::F64p => 8,
        }
    }

    pub const fn is_planar(self) -> bool {
        matches!(self, Self::S16p | Self::S32p | Self::F32p | Self::F64p)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F32p | Self::F64 | Self::F64p)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::F32 => "flt",
            Self::F64 => "dbl",
            Self::S16p => "s16p",
            Self::S32p => "s32p",
            Self::F32p => "fltp",
            Self::F64p => "dblp",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw video pixel formats accepted by the video session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Planar YUV 4:2:0 (I420), 12bpp
    Yuv420p,
    /// Semi-planar YUV 4:2:0, 12bpp
    Nv12,
    /// Planar YUV 4:2:2, 16bpp
    Yuv422p,
    /// Planar YUV 4:4:4, 24bpp
    Yuv444p,
}

impl PixelFormat {
    /// Byte size of each plane of a `width x height` frame, in plane order.
    ///
    /// Odd dimensions round the chroma planes up.
    pub fn plane_sizes(self, width: u32, height: u32) -> Vec<usize> {
        let w = width as usize;
        let h = height as usize;
        let half_w = w.div_ceil(2);
        let half_h = h.div_ceil(2);
        match self {
            Self::Yuv420p => vec![w * h, half_w * half_h, half_w * half_h],
            Self::Nv12 => vec![w * h, half_w * 2 * half_h],
            Self::Yuv422p => vec![w * h, half_w * h, half_w * h],
            Self::Yuv444p => vec![w * h, w * h, w * h],
        }
    }

    /// Total bytes of one frame
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        self.plane_sizes(width, height).iter().sum()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Nv12 => "nv12",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Audio channel layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Mono,
    Stereo,
    #[serde(rename = "2.1")]
    Surround2_1,
    #[serde(rename = "3.0")]
    Surround3_0,
    #[serde(rename = "4.0")]
    Surround4_0,
    #[serde(rename = "5.0")]
    Surround5_0,
    #[serde(rename = "5.1")]
    Surround5_1,
    #[serde(rename = "7.1")]
    Surround7_1,
}

impl ChannelLayout {
    pub const fn channels(self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Surround2_1 | Self::Surround3_0 => 3,
            Self::Surround4_0 => 4,
            Self::Surround5_0 => 5,
            Self::Surround5_1 => 6,
            Self::Surround7_1 => 8,
        }
    }

    /// MPEG-4 channel configuration code written into ADTS headers.
    ///
    /// Layouts without a standard configuration return `None`.
    pub const fn adts_channel_config(self) -> Option<u8> {
        match self {
            Self::Mono => Some(1),
            Self::Stereo => Some(2),
            Self::Surround3_0 => Some(3),
            Self::Surround4_0 => Some(4),
            Self::Surround5_0 => Some(5),
            Self::Surround5_1 => Some(6),
            Self::Surround7_1 => Some(7),
            Self::Surround2_1 => None,
        }
    }

    /// Layout for an exact channel count, if one is defined
    pub const fn from_channels(count: u16) -> Option<Self> {
        match count {
            1 => Some(Self::Mono),
            2 => Some(Self::Stereo),
            3 => Some(Self::Surround3_0),
            4 => Some(Self::Surround4_0),
            5 => Some(Self::Surround5_0),
            6 => Some(Self::Surround5_1),
            8 => Some(Self::Surround7_1),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Mono => "mono",
            Self::Stereo => "stereo",
            Self::Surround2_1 => "2.1",
            Self::Surround3_0 => "3.0",
            Self::Surround4_0 => "4.0",
            Self::Surround5_0 => "5.0",
            Self::Surround5_1 => "5.1",
            Self::Surround7_1 => "7.1",
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rational number, used for frame rates and time bases.
///
/// Equality compares values in lowest terms, so `60/2 == 30/1`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Lowest terms with a non-negative denominator
    pub fn reduced(self) -> Self {
        let (mut a, mut b) = (self.num.unsigned_abs(), self.den.unsigned_abs());
        while b != 0 {
            (a, b) = (b, a % b);
        }
        if a == 0 {
            return self;
        }
        let divisor = a as i64;
        let sign = if self.den < 0 { -1 } else { 1 };
        Self {
            num: (self.num as i64 * sign / divisor) as i32,
            den: (self.den as i64 * sign / divisor) as i32,
        }
    }

    pub const fn invert(self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }

    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

impl PartialEq for Rational {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.reduced(), other.reduced());
        a.num == b.num && a.den == b.den
    }
}

impl Eq for Rational {}

impl Hash for Rational {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let r = self.reduced();
        r.num.hash(state);
        r.den.hash(state);
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// AAC encoder profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AacProfile {
    Main,
    #[serde(rename = "lc")]
    Low,
    Ssr,
    Ltp,
    #[serde(rename = "he")]
    HighEfficiency,
    #[serde(rename = "he-v2")]
    HighEfficiencyV2,
}

impl AacProfile {
    /// Two-bit ADTS profile field (MPEG-4 audio object type minus one).
    ///
    /// HE-AAC streams are signalled as LC with implicit SBR, so both HE
    /// variants map to the LC code.
    pub const fn adts_object_type(self) -> u8 {
        match self {
            Self::Main => 0,
            Self::Low | Self::HighEfficiency | Self::HighEfficiencyV2 => 1,
            Self::Ssr => 2,
            Self::Ltp => 3,
        }
    }

    /// Inverse of [`AacProfile::adts_object_type`] for the four base profiles
    pub const fn from_adts_object_type(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Main),
            1 => Some(Self::Low),
            2 => Some(Self::Ssr),
            3 => Some(Self::Ltp),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Main => "Main",
            Self::Low => "LC",
            Self::Ssr => "SSR",
            Self::Ltp => "LTP",
            Self::HighEfficiency => "HE-AAC",
            Self::HighEfficiencyV2 => "HE-AACv2",
        }
    }
}

impl fmt::Display for AacProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// H.264 profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum H264Profile {
    Baseline,
    ConstrainedBaseline,
    Main,
    Extended,
    High,
    High10,
    High422,
    High444,
}

impl H264Profile {
    /// `profile_idc` as written into the SPS
    pub const fn profile_idc(self) -> u8 {
        match self {
            Self::Baseline | Self::ConstrainedBaseline => 66,
            Self::Main => 77,
            Self::Extended => 88,
            Self::High => 100,
            Self::High10 => 110,
            Self::High422 => 122,
            Self::High444 => 244,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Baseline => "Baseline",
            Self::ConstrainedBaseline => "Constrained Baseline",
            Self::Main => "Main",
            Self::Extended => "Extended",
            Self::High => "High",
            Self::High10 => "High 10",
            Self::High422 => "High 4:2:2",
            Self::High444 => "High 4:4:4 Predictive",
        }
    }
}

impl fmt::Display for H264Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format_sizes() {
        assert_eq!(SampleFormat::U8.bytes_per_sample(), 1);
        assert_eq!(SampleFormat::S16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::F32p.bytes_per_sample(), 4);
        assert_eq!(SampleFormat::F64.bytes_per_sample(), 8);
        assert!(SampleFormat::F32p.is_planar());
        assert!(!SampleFormat::S16.is_planar());
    }

    #[test]
    fn test_yuv420_frame_is_one_and_a_half_bytes_per_pixel() {
        assert_eq!(PixelFormat::Yuv420p.frame_size(1280, 720), 1280 * 720 * 3 / 2);
        assert_eq!(PixelFormat::Nv12.frame_size(640, 480), 640 * 480 * 3 / 2);
    }

    #[test]
    fn test_odd_dimensions_round_chroma_up() {
        let planes = PixelFormat::Yuv420p.plane_sizes(5, 3);
        assert_eq!(planes, vec![15, 6, 6]);
    }

    #[test]
    fn test_channel_layout_codes() {
        assert_eq!(ChannelLayout::Stereo.channels(), 2);
        assert_eq!(ChannelLayout::Stereo.adts_channel_config(), Some(2));
        assert_eq!(ChannelLayout::Surround7_1.adts_channel_config(), Some(7));
        assert_eq!(ChannelLayout::Surround2_1.adts_channel_config(), None);
        assert_eq!(ChannelLayout::from_channels(6), Some(ChannelLayout::Surround5_1));
        assert_eq!(ChannelLayout::from_channels(7), None);
    }

    #[test]
    fn test_aac_profile_codes() {
        assert_eq!(AacProfile::Low.adts_object_type(), 1);
        assert_eq!(AacProfile::HighEfficiency.adts_object_type(), 1);
        assert_eq!(AacProfile::from_adts_object_type(3), Some(AacProfile::Ltp));
        assert_eq!(AacProfile::from_adts_object_type(4), None);
    }

    #[test]
    fn test_rational_invert() {
        let fps = Rational::new(30000, 1001);
        assert_eq!(fps.invert(), Rational::new(1001, 30000));
        assert!((fps.to_f64() - 29.97).abs() < 0.01);
        assert_eq!(Rational::new(1, 0).to_f64(), 0.0);
    }

    #[test]
    fn test_rational_compares_in_lowest_terms() {
        assert_eq!(Rational::new(60, 2), Rational::new(30, 1));
        assert_eq!(Rational::new(-2, -4), Rational::new(1, 2));
        assert_eq!(Rational::new(60, 2).reduced(), Rational::new(30, 1));
        assert_eq!(Rational::new(3, -6).reduced().den, 2);
        assert_ne!(Rational::new(30000, 1001), Rational::new(30, 1));

        let rates: std::collections::HashSet<_> =
            [Rational::new(25, 1), Rational::new(50, 2)].into_iter().collect();
        assert_eq!(rates.len(), 1);
    }
}
