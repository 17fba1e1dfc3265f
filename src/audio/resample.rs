/// Average interleaved frames down to one channel
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels_f64 = f64::from(channels);
    samples
        .chunks(usize::from(channels))
        .map(|frame| {
            let sum_f64: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            // f64 → f32: audio samples are stored as f32, precision sufficient
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum_f64 / channels_f64) as f32
            }
        })
        .collect()
}

/// Linear-interpolation resampling of a mono signal
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    // Fractional index math needs f64 ↔ usize conversions
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    {
        let ratio = f64::from(from_rate) / f64::from(to_rate);

        // ceil(len * to / from) in integers so whole seconds map exactly
        let output_len = (samples.len() as u64 * u64::from(to_rate))
            .div_ceil(u64::from(from_rate)) as usize;

        let last = samples.len() - 1;
        let mut resampled = Vec::with_capacity(output_len);
        for i in 0..output_len {
            let src_idx_f64 = (i as f64) * ratio;
            let src_idx_floor = (src_idx_f64.floor() as usize).min(last);
            let src_idx_ceil = (src_idx_floor + 1).min(last);
            let fract = src_idx_f64 - src_idx_f64.floor();

            let s1 = f64::from(samples[src_idx_floor]);
            let s2 = f64::from(samples[src_idx_ceil]);
            resampled.push(s1.mul_add(1.0 - fract, s2 * fract) as f32);
        }

        resampled
    }
}

/// Downmix then resample to `target_rate`
pub fn to_mono_at_rate(
    samples: &[f32],
    channels: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let mono = downmix_to_mono(samples, channels);
    let resampled = resample_linear(&mono, source_rate, target_rate);

    tracing::trace!(
        source_rate,
        target_rate,
        channels,
        input_samples = samples.len(),
        output_samples = resampled.len(),
        "resampled to mono"
    );

    resampled
}
