//! CPAL output stream construction.
//!
//! Builds the hardware output stream around a render closure producing
//! interleaved `f32`; conversion to the device sample format happens here so
//! render closures stay format-agnostic. Shared by the output engine and the
//! overlay mixer.

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

/// Render closure invoked from the hardware callback. Must fill the whole
/// slice and must not block.
pub(crate) type RenderFn = Box<dyn FnMut(&mut [f32]) + Send>;

/// Build an output stream for whatever sample format the device negotiated.
///
/// `scratch_len` sizes the intermediate `f32` buffer up front so the
/// callback does not allocate in the steady state.
pub(crate) fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    scratch_len: usize,
    render: RenderFn,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, scratch_len, render),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, scratch_len, render),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, scratch_len, render),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, scratch_len, render),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    scratch_len: usize,
    mut render: RenderFn,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let err_fn = |err| tracing::warn!("stream error: {err}");
    let mut scratch: Vec<f32> = vec![0.0; scratch_len];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if scratch.len() != data.len() {
                scratch.resize(data.len(), 0.0);
            }
            render(&mut scratch);
            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
