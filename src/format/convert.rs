//! Sample format and channel layout conversion.

/// Converts f32 samples to i16.
///
/// Input should be in the range [-1.0, 1.0]. Values outside this range are
/// clamped. Uses × 32767 for symmetric scaling, so -1.0 maps to -32767.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Converts i16 samples to f32 in the range [-1.0, 1.0].
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Splits interleaved i16 frames into one f32 vector per channel.
///
/// Trailing samples that don't form a whole frame are ignored.
pub fn deinterleave(interleaved: &[i16], channels: u16) -> Vec<Vec<f32>> {
    let channels = usize::from(channels.max(1));
    let frames = interleaved.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];

    for frame in interleaved.chunks_exact(channels) {
        for (channel, &sample) in planar.iter_mut().zip(frame) {
            channel.push(i16_to_f32(sample));
        }
    }

    planar
}

/// Interleaves planar channels into `out_channels` output channels.
///
/// Mono input is duplicated to every output channel; extra input channels
/// beyond `out_channels` are dropped; missing ones are filled from the last
/// input channel.
pub fn interleave(planar: &[Vec<f32>], out_channels: u16) -> Vec<f32> {
    let out_channels = usize::from(out_channels.max(1));
    let Some(last) = planar.len().checked_sub(1) else {
        return Vec::new();
    };
    let frames = planar[0].len();
    let mut out = Vec::with_capacity(frames * out_channels);

    for i in 0..frames {
        for ch in 0..out_channels {
            out.push(planar[ch.min(last)][i]);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16_full_range() {
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-1.0), -32767);
        assert_eq!(f32_to_i16(0.0), 0);
    }

    #[test]
    fn test_f32_to_i16_clamping() {
        assert_eq!(f32_to_i16(2.0), 32767);
        assert_eq!(f32_to_i16(-2.0), -32768);
    }

    #[test]
    fn test_i16_to_f32() {
        assert!((i16_to_f32(16384) - 0.5).abs() < f32::EPSILON);
        assert!((i16_to_f32(i16::MIN) + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_deinterleave_stereo() {
        let planar = deinterleave(&[16384, -16384, 0, 8192, 99], 2);
        assert_eq!(planar.len(), 2);
        assert_eq!(planar[0], vec![0.5, 0.0]);
        assert_eq!(planar[1], vec![-0.5, 0.25]);
    }

    #[test]
    fn test_interleave_mono_to_stereo() {
        let out = interleave(&[vec![0.1, 0.2]], 2);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_interleave_drops_extra_channels() {
        let out = interleave(&[vec![0.1], vec![0.2], vec![0.3]], 2);
        assert_eq!(out, vec![0.1, 0.2]);
    }

    #[test]
    fn test_interleave_empty() {
        assert!(interleave(&[], 2).is_empty());
    }
}
