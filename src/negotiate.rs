//! Capability negotiation
//!
//! A requested stream configuration is checked against the capability lists
//! a codec declares before the codec is ever opened. A list that is absent
//! or empty means the codec places no constraint on that dimension.

use std::fmt;
use thiserror::Error;

use crate::stream::StreamConfig;
use crate::types::ChannelLayout;

/// Configuration dimension that capability lists constrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Format,
    Rate,
    ChannelLayout,
    Profile,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Format => write!(f, "format"),
            Dimension::Rate => write!(f, "rate"),
            Dimension::ChannelLayout => write!(f, "channel layout"),
            Dimension::Profile => write!(f, "profile"),
        }
    }
}

/// Support lists declared by a codec. Read-only to the negotiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityTable<F, R, P> {
    pub formats: Option<Vec<F>>,
    pub rates: Option<Vec<R>>,
    pub channel_layouts: Option<Vec<ChannelLayout>>,
    pub profiles: Option<Vec<P>>,
}

/// Capability table matching a stream configuration type
pub type CapabilitiesOf<C> = CapabilityTable<
    <C as StreamConfig>::Format,
    <C as StreamConfig>::Rate,
    <C as StreamConfig>::Profile,
>;

impl<F, R, P> CapabilityTable<F, R, P> {
    /// A table that declares nothing and therefore accepts anything
    pub fn unconstrained() -> Self {
        Self {
            formats: None,
            rates: None,
            channel_layouts: None,
            profiles: None,
        }
    }

    pub fn with_formats(mut self, formats: impl IntoIterator<Item = F>) -> Self {
        self.formats = Some(formats.into_iter().collect());
        self
    }

    pub fn with_rates(mut self, rates: impl IntoIterator<Item = R>) -> Self {
        self.rates = Some(rates.into_iter().collect());
        self
    }

    pub fn with_channel_layouts(mut self, layouts: impl IntoIterator<Item = ChannelLayout>) -> Self {
        self.channel_layouts = Some(layouts.into_iter().collect());
        self
    }

    pub fn with_profiles(mut self, profiles: impl IntoIterator<Item = P>) -> Self {
        self.profiles = Some(profiles.into_iter().collect());
        self
    }
}

/// The values a configuration asks the codec to support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requested<F, R, P> {
    pub format: F,
    pub rate: R,
    /// `None` for streams without a channel dimension
    pub channel_layout: Option<ChannelLayout>,
    pub profile: P,
}

/// One dimension the codec declined
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{dimension} {value}")]
pub struct Rejection {
    pub dimension: Dimension,
    pub value: String,
}

/// Configuration rejected by capability negotiation.
///
/// Every failing dimension is reported, in check order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("codec {codec} does not support {}", join_rejections(.rejections))]
pub struct CapabilityError {
    codec: String,
    rejections: Vec<Rejection>,
}

fn join_rejections(rejections: &[Rejection]) -> String {
    rejections
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl CapabilityError {
    /// First dimension that failed
    pub fn dimension(&self) -> Dimension {
        self.rejections[0].dimension
    }

    pub fn rejections(&self) -> &[Rejection] {
        &self.rejections
    }

    pub fn rejects(&self, dimension: Dimension) -> bool {
        self.rejections.iter().any(|r| r.dimension == dimension)
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }
}

/// A configuration that passed negotiation against a codec's table
#[derive(Debug, Clone, PartialEq)]
pub struct Negotiated<C> {
    config: C,
}

impl<C> Negotiated<C> {
    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn into_inner(self) -> C {
        self.config
    }
}

/// Check `config` against `capabilities`.
///
/// On success the accepted configuration is logged at info level.
pub fn negotiate<C: StreamConfig>(
    codec: &str,
    config: C,
    capabilities: &CapabilitiesOf<C>,
) -> Result<Negotiated<C>, CapabilityError> {
    let requested = config.requested();
    let mut rejections = Vec::new();

    check(
        codec,
        Dimension::Format,
        capabilities.formats.as_deref(),
        &requested.format,
        &mut rejections,
    );
    check(
        codec,
        Dimension::Rate,
        capabilities.rates.as_deref(),
        &requested.rate,
        &mut rejections,
    );
    if let Some(layout) = requested.channel_layout {
        check(
            codec,
            Dimension::ChannelLayout,
            capabilities.channel_layouts.as_deref(),
            &layout,
            &mut rejections,
        );
    }
    check(
        codec,
        Dimension::Profile,
        capabilities.profiles.as_deref(),
        &requested.profile,
        &mut rejections,
    );

    if !rejections.is_empty() {
        return Err(CapabilityError {
            codec: codec.to_string(),
            rejections,
        });
    }

    log::info!("{} {} encoder config: {}", codec, C::MEDIA, config.summary());
    Ok(Negotiated { config })
}

fn check<T: PartialEq + fmt::Display>(
    codec: &str,
    dimension: Dimension,
    declared: Option<&[T]>,
    requested: &T,
    rejections: &mut Vec<Rejection>,
) {
    match declared {
        None | Some([]) => {
            log::info!("{} declares no {} constraint, accepting {}", codec, dimension, requested);
        }
        Some(supported) if supported.contains(requested) => {}
        Some(_) => {
            log::warn!("{} does not support {} {}", codec, dimension, requested);
            rejections.push(Rejection {
                dimension,
                value: requested.to_string(),
            });
        }
    }
}
