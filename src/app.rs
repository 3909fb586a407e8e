//! Application wiring and the long-lived conversation loop.

use std::time::Duration;

use tracing::{error, info};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::error::Result;
use crate::interrupt::{InterruptController, InterruptReason};
use crate::pipeline::TurnEvent;

/// Installs the global tracing subscriber. `RUST_LOG` overrides the
/// verbosity flags.
pub fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// CLI entry point.
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_loop(config).await,
        Command::Devices => {
            for name in list_devices()? {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Config => {
            let rendered =
                toml::to_string_pretty(&config).map_err(|e| crate::error::ParloError::Other(
                    format!("Failed to render config: {}", e),
                ))?;
            print!("{}", rendered);
            Ok(())
        }
    }
}

/// The top-level loop. Turn errors are logged and the loop continues;
/// only shutdown ends it.
async fn run_loop(config: Config) -> Result<()> {
    let interrupt = InterruptController::new();
    let mut engine = build::turn_engine(&config, &interrupt)?;
    let inter_turn_delay = Duration::from_millis(config.turn.inter_turn_delay_ms);

    {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                interrupt.trigger(InterruptReason::Shutdown);
            }
        });
    }

    info!("listening (ctrl-c to exit)");
    while !interrupt.is_shutdown() {
        let barge_in = match engine.run_turn().await {
            Ok(TurnEvent::Completed { barge_in }) => barge_in,
            Ok(TurnEvent::NoSpeech) | Ok(TurnEvent::HistoryCleared) => false,
            Err(e) => {
                error!(error = %e, "turn failed");
                false
            }
        };
        if interrupt.is_shutdown() {
            break;
        }
        // A barge-in flows straight into the next recording; otherwise
        // give the room a moment of quiet between turns.
        if !barge_in {
            interrupt.sleep_interruptible(inter_turn_delay).await;
        }
    }
    info!("stopped");
    Ok(())
}

#[cfg(feature = "cpal-audio")]
fn list_devices() -> Result<Vec<String>> {
    crate::audio::list_input_devices()
}

#[cfg(not(feature = "cpal-audio"))]
fn list_devices() -> Result<Vec<String>> {
    Err(crate::error::ParloError::Device {
        message: "built without the cpal-audio feature".to_string(),
    })
}

#[cfg(feature = "cpal-audio")]
mod build {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::asr::{
        EnergyOracle, HttpTranscriptionService, InferenceGate, TranscriptionService,
    };
    use crate::audio::playback::AudioSink;
    use crate::audio::{CpalAudioSink, CpalChunkSource};
    use crate::chat::create_chat_service;
    use crate::config::Config;
    use crate::defaults;
    use crate::error::Result;
    use crate::interrupt::InterruptController;
    use crate::pipeline::{StreamingResponsePipeline, TurnEngine};
    use crate::recorder::{RecorderIo, SegmentedRecorder};
    use crate::tts::{HttpSynthesisService, SpeechSynthesisService};

    pub fn turn_engine(config: &Config, interrupt: &InterruptController) -> Result<TurnEngine> {
        let source = CpalChunkSource::new(
            config.audio.device.as_deref(),
            config.audio.sample_rate,
            config.audio.chunk_samples,
        )?;
        let io = Arc::new(Mutex::new(RecorderIo {
            source: Box::new(source),
            oracle: Box::new(EnergyOracle::default()),
        }));

        let inference = InferenceGate::new();
        let gate_config = config.vad.to_gate_config(&config.audio);

        let transcriber: Arc<dyn TranscriptionService> = Arc::new(HttpTranscriptionService::new(
            &config.asr.endpoint,
            &config.asr.language,
        )?);
        let recorder = SegmentedRecorder::new(
            Arc::clone(&io),
            transcriber,
            inference.clone(),
            interrupt.clone(),
            gate_config.clone(),
            Duration::from_millis(config.vad.continuation_probe_ms),
        );

        let synthesizer: Arc<dyn SpeechSynthesisService> =
            Arc::new(HttpSynthesisService::new(&config.tts)?);
        let sink: Arc<Mutex<Box<dyn AudioSink>>> = Arc::new(Mutex::new(Box::new(
            CpalAudioSink::new(config.audio.output_device.as_deref()),
        )));
        let pipeline = StreamingResponsePipeline::new(
            synthesizer,
            sink,
            Duration::from_secs(config.tts.deadline_secs),
            defaults::PIPELINE_QUEUE_DEPTH,
        );

        let chat = create_chat_service(&config.chat)?;
        Ok(TurnEngine::new(
            recorder,
            io,
            chat,
            pipeline,
            config.chat.max_history,
            interrupt.clone(),
            inference,
            gate_config,
        ))
    }
}

#[cfg(not(feature = "cpal-audio"))]
mod build {
    use crate::config::Config;
    use crate::error::{ParloError, Result};
    use crate::interrupt::InterruptController;
    use crate::pipeline::TurnEngine;

    pub fn turn_engine(_config: &Config, _interrupt: &InterruptController) -> Result<TurnEngine> {
        Err(ParloError::Device {
            message: "built without the cpal-audio feature".to_string(),
        })
    }
}
