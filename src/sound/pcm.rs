//! Sample normalization and volume scaling.
//!
//! Every source format is brought to signed 16-bit before the volume multiplier
//! is applied, and the result is clipped to the 16-bit range.

/// Decoded samples in the bit depth and signedness they were stored with.
#[derive(Clone, Debug, PartialEq)]
pub enum PcmSamples {
    /// 8-bit unsigned, centered on 128.
    U8(Vec<u8>),
    I16(Vec<i16>),
    /// 32-bit signed. 24-bit sources are widened into this range on decode.
    I32(Vec<i32>),
    /// Floating point in `[-1.0, 1.0]`.
    F32(Vec<f32>),
}

impl PcmSamples {
    pub fn len(&self) -> usize {
        match self {
            PcmSamples::U8(s) => s.len(),
            PcmSamples::I16(s) => s.len(),
            PcmSamples::I32(s) => s.len(),
            PcmSamples::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts the samples to signed 16-bit without changing their level.
    pub fn to_i16(&self) -> Vec<i16> {
        match self {
            PcmSamples::U8(s) => s.iter().map(|&x| (x as i16 - 128) * 256).collect(),
            PcmSamples::I16(s) => s.clone(),
            PcmSamples::I32(s) => s.iter().map(|&x| (x >> 16) as i16).collect(),
            PcmSamples::F32(s) => s.iter().map(|&x| clip(x * 32767.0)).collect(),
        }
    }

    /// Produces signed 16-bit samples at the given volume.
    /// At full volume 16-bit samples pass through untouched.
    pub fn scaled(&self, volume: f32) -> Vec<i16> {
        match self {
            PcmSamples::I16(s) if volume == 1.0 => s.clone(),
            PcmSamples::F32(s) => s.iter().map(|&x| clip(x * 32767.0 * volume)).collect(),
            _ => scale_i16(&self.to_i16(), volume),
        }
    }
}

/// Applies a volume multiplier to 16-bit samples, clipping the result.
pub fn scale_i16(samples: &[i16], volume: f32) -> Vec<i16> {
    samples.iter().map(|&x| clip(x as f32 * volume)).collect()
}

#[inline]
fn clip(x: f32) -> i16 {
    x.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
