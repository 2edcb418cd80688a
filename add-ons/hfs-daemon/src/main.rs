//! HFS guard daemon.
//!
//! Hosts a [`Guardian`] and feeds it newline-delimited JSON from stdin. Each line
//! is either a guard event (`{"event":"screen_on"}`) or an admin command
//! (`{"command":"arm","armed":true}`).

mod adapters;

use std::sync::Arc;

use adapters::{ConsolePresenter, ConsoleTransmitter, SharedChannels, SharedRadio};
use hfs_core::{AesGcmCipher, ChannelIdentity, Collaborators, EngineConfig, GuardEvent, Guardian, SettingsStore, SystemClock};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum AdminCommand {
    Arm { armed: bool },
    PhoneProtection { enabled: bool },
    Protect { contexts: Vec<String> },
    EmergencyNumber { number: String },
    SetChannels { channels: Vec<ChannelIdentity> },
    DenyChannels { denied: bool },
    RadioDisabled { disabled: bool },
    TrustCurrentChannels,
    IntruderLog,
    DeleteIntruder { id: String },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Input {
    Event(GuardEvent),
    Admin(AdminCommand),
}

struct Platform {
    channels: Arc<SharedChannels>,
    radio: Arc<SharedRadio>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[hfs-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::load()?;
    let store = Arc::new(SettingsStore::open_path(&config.storage_path)?);
    let cipher = Arc::new(AesGcmCipher::from_env());

    let platform = Platform {
        channels: Arc::new(SharedChannels::default()),
        radio: Arc::new(SharedRadio::default()),
    };
    let collaborators = Collaborators::new(
        platform.channels.clone(),
        Arc::new(ConsoleTransmitter),
        Arc::new(ConsolePresenter),
        platform.radio.clone(),
    );
    let guardian = Guardian::assemble(&config, Arc::clone(&store), cipher, Arc::new(SystemClock), collaborators);
    guardian.start();

    tracing::info!(storage_path = %config.storage_path, "hfs daemon started; reading events from stdin");

    let handle = guardian.handle();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        tracing::info!("stdin closed; shutting down");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "stdin read failed; shutting down");
                        break;
                    }
                };
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                match serde_json::from_str::<Input>(trimmed) {
                    Ok(Input::Event(event)) => {
                        if let Err(e) = handle.send(event).await {
                            tracing::error!(error = %e, "guardian rejected event");
                        }
                    }
                    Ok(Input::Admin(command)) => {
                        if let Err(e) = apply(&guardian, &platform, command) {
                            tracing::warn!(error = %e, "admin command failed");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, line = %trimmed, "unrecognized input line"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down daemon");
                break;
            }
        }
    }

    guardian.stop().await;
    store.flush()?;
    Ok(())
}

fn apply(guardian: &Guardian, platform: &Platform, command: AdminCommand) -> Result<(), Box<dyn std::error::Error>> {
    let store = guardian.store();
    match command {
        AdminCommand::Arm { armed } => store.set_tamper_watchdog_armed(armed)?,
        AdminCommand::PhoneProtection { enabled } => store.set_phone_protection_enabled(enabled)?,
        AdminCommand::Protect { contexts } => store.set_protected_contexts(contexts)?,
        AdminCommand::EmergencyNumber { number } => guardian.set_emergency_number(&number)?,
        AdminCommand::SetChannels { channels } => platform.channels.set(channels),
        AdminCommand::DenyChannels { denied } => platform.channels.set_denied(denied),
        AdminCommand::RadioDisabled { disabled } => platform.radio.set_disabled(disabled),
        AdminCommand::TrustCurrentChannels => {
            let slots = guardian.mark_current_channels_trusted()?;
            tracing::info!(slots, "current channels marked trusted");
        }
        AdminCommand::IntruderLog => {
            for record in store.intruder_records()? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        AdminCommand::DeleteIntruder { id } => {
            let deleted = store.delete_intruder(&id)?;
            tracing::info!(%id, deleted, "intruder record delete");
        }
    }
    Ok(())
}
