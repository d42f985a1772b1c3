//! CPAL-based audio sink.
//!
//! Split in two because `cpal::Stream` is not `Send`: the [`CpalSink`]
//! half (ring producer + running flag) moves into the render thread,
//! while the [`CpalStream`] half stays with the caller to keep the
//! device stream alive.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::traits::{AudioError, AudioSink};

/// Producer half: where the render loop writes DAC codes.
pub struct CpalSink {
    sample_rate: u32,
    producer: HeapProd<u8>,
    running: Arc<AtomicBool>,
}

/// Device half: owns the cpal stream. Not `Send`; keep it alive on the
/// thread that built it for as long as audio should play.
pub struct CpalStream {
    _stream: Stream,
}

impl CpalSink {
    /// Open the default output device at the given rate and start its
    /// stream. The stream plays silence until [`AudioSink::start`] is
    /// called on the sink half.
    pub fn new(sample_rate: u32) -> Result<(CpalSink, CpalStream), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        // The synth renders mono; the callback duplicates into a
        // forced 2-channel interleaving.
        let config = StreamConfig {
            channels: 2,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Ring buffer of about 100 ms of samples.
        let rb = HeapRb::<u8>::new((sample_rate / 10) as usize);
        let (producer, mut consumer) = rb.split();

        let running = Arc::new(AtomicBool::new(false));
        let callback_running = running.clone();
        let channels = config.channels as usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !callback_running.load(Ordering::Relaxed) {
                        for sample in data.iter_mut() {
                            *sample = 0.0;
                        }
                        return;
                    }

                    for chunk in data.chunks_mut(channels) {
                        // 128 is DAC mid-rail; map 0..255 onto -1..1.
                        let value = match consumer.try_pop() {
                            Some(code) => (code as f32 - 128.0) / 128.0,
                            None => 0.0,
                        };
                        for sample in chunk.iter_mut() {
                            *sample = value;
                        }
                    }
                },
                |err| log::error!("audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::Playback(e.to_string()))?;

        Ok((
            CpalSink {
                sample_rate,
                producer,
                running,
            },
            CpalStream { _stream: stream },
        ))
    }
}

impl AudioSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write_spin(&mut self, sample: u8) {
        while self.producer.try_push(sample).is_err() {
            if !self.running.load(Ordering::Relaxed) {
                // Nobody is draining; drop instead of spinning forever.
                return;
            }
            std::hint::spin_loop();
        }
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        Ok(())
    }
}
