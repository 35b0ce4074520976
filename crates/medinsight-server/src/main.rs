//! `MedInsight` server
//!
//! HTTP API for OTP login and time-boxed patient record access, plus admin
//! subcommands for seeding staff, patients and records.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use medinsight_core::config::{self, NotifyConfig};
use medinsight_core::tracing_init::{LogFormat, build_filter, init_tracing};
use medinsight_core::{Config, SystemClock};
use medinsight_crypto::RecordCipher;
use medinsight_server::auth::password::hash_password;
use medinsight_server::notify::{LogNotifier, Notifier};
use medinsight_server::server::{AppState, build_router};
use medinsight_server::storage::{MedDatabase, NewMedicalRecord, NewPatient, Role};

const DEFAULT_FILTER: &str = "medinsight_server=info";

#[derive(Parser, Debug)]
#[command(name = "medinsight-server")]
#[command(
    version,
    about = "MedInsight server - OTP login and time-boxed patient record access"
)]
struct Args {
    /// JSON config file layered over the global settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to SQLite database file.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve {
        /// Address to listen on.
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// JWT signing secret.
        #[arg(long, env = "MEDINSIGHT_JWT_SECRET", hide_env_values = true)]
        jwt_secret: Option<String>,

        /// Secret the record encryption key is derived from.
        #[arg(long, env = "MEDINSIGHT_RECORD_SECRET", hide_env_values = true)]
        record_secret: Option<String>,

        /// OTLP collector endpoint for traces and metrics.
        #[cfg(feature = "metrics")]
        #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
        otlp_endpoint: Option<String>,
    },

    /// Create a staff account.
    CreateUser {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long, env = "MEDINSIGHT_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long, value_enum)]
        role: RoleArg,

        #[arg(long)]
        department: Option<String>,
    },

    /// Register a patient.
    CreatePatient {
        #[arg(long)]
        name: String,

        #[arg(long)]
        birth_date: Option<String>,

        #[arg(long)]
        gender: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        address: Option<String>,
    },

    /// Add a medical record; the diagnosis is encrypted before storage.
    AddRecord {
        #[arg(long)]
        patient_id: i64,

        #[arg(long)]
        author_id: i64,

        #[arg(long)]
        diagnosis: String,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        symptoms: Option<String>,

        #[arg(long)]
        treatment: Option<String>,

        #[arg(long)]
        medications: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Admin,
    Doctor,
}

impl From<RoleArg> for Role {
    fn from(r: RoleArg) -> Self {
        match r {
            RoleArg::Admin => Self::Admin,
            RoleArg::Doctor => Self::Doctor,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = config::load_config(args.config.as_deref())?;
    if let Some(path) = &args.db_path {
        config.server.database_path = Some(path.clone());
    }

    init_tracing(
        build_filter(DEFAULT_FILTER, Some(&config.server.log_level)),
        LogFormat::from_json_flag(args.log_json),
    );

    match args.command {
        Command::Serve {
            addr,
            jwt_secret,
            record_secret,
            #[cfg(feature = "metrics")]
            otlp_endpoint,
        } => {
            if let Some(addr) = addr {
                config.server.addr = addr;
            }
            if let Some(secret) = jwt_secret {
                config.auth.jwt_secret = secret;
            }
            if let Some(secret) = record_secret {
                config.records.encryption_secret = secret;
            }
            config.validate()?;

            #[cfg(feature = "metrics")]
            let metrics_guard = otlp_endpoint
                .as_deref()
                .map(medinsight_core::metrics::init_metrics)
                .transpose()?;

            serve(config).await?;

            #[cfg(feature = "metrics")]
            if let Some(guard) = metrics_guard {
                if let Err(e) = guard.shutdown() {
                    warn!(error = %e, "Metrics shutdown failed");
                }
            }
        }
        Command::CreateUser {
            name,
            email,
            password,
            role,
            department,
        } => {
            let db = open_database(&config).await?;
            let user = db
                .create_user(
                    &name,
                    &email,
                    &hash_password(&password)?,
                    role.into(),
                    department.as_deref(),
                )
                .await?;
            info!(id = user.id, email = %user.email, role = %user.role, "User created");
        }
        Command::CreatePatient {
            name,
            birth_date,
            gender,
            phone,
            address,
        } => {
            let db = open_database(&config).await?;
            let patient = db
                .create_patient(&NewPatient {
                    name: &name,
                    birth_date: birth_date.as_deref(),
                    gender: gender.as_deref(),
                    phone: phone.as_deref(),
                    address: address.as_deref(),
                })
                .await?;
            info!(id = patient.id, "Patient created");
        }
        Command::AddRecord {
            patient_id,
            author_id,
            diagnosis,
            notes,
            symptoms,
            treatment,
            medications,
        } => {
            let db = open_database(&config).await?;
            let cipher = RecordCipher::from_secret(config.records.encryption_secret.as_bytes())?;
            let sealed = cipher.seal(&diagnosis)?;
            let record = db
                .add_medical_record(&NewMedicalRecord {
                    patient_id,
                    author_id,
                    diagnosis: &sealed,
                    notes: notes.as_deref(),
                    symptoms: symptoms.as_deref(),
                    treatment: treatment.as_deref(),
                    medications: medications.as_deref(),
                })
                .await?;
            info!(id = record.id, patient_id, "Medical record added");
        }
    }

    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.addr,
        "Starting medinsight-server"
    );

    for setting in config.default_secrets() {
        warn!(setting, "Built-in development secret in use; set it before storing real data");
    }

    let db = open_database(&config).await?;
    let cipher = Arc::new(RecordCipher::from_secret(
        config.records.encryption_secret.as_bytes(),
    )?);
    let notifier = build_notifier(&config.notify)?;
    let state = AppState::new(db.clone(), SystemClock::shared(), &config, cipher, notifier);

    // Expired challenges are also swept on every issue; this catches idle pairs.
    let sweep_otp = state.otp.clone();
    let sweep_db = db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            match sweep_otp.sweep_expired().await {
                Ok(removed) if removed > 0 => {
                    info!(removed, "Background challenge sweep completed");
                }
                Err(e) => warn!(error = %e, "Background challenge sweep failed"),
                _ => {}
            }
            if let Err(e) = sweep_db
                .purge_revoked_tokens(medinsight_core::db::unix_timestamp())
                .await
            {
                warn!(error = %e, "Revoked token purge failed");
            }
        }
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.server.addr).await?;
    info!(addr = %config.server.addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn open_database(config: &Config) -> anyhow::Result<MedDatabase> {
    let path = match &config.server.database_path {
        Some(path) => path.clone(),
        None => config::database_path()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine config directory"))?,
    };
    info!(path = %path.display(), "Opening database");
    Ok(MedDatabase::open(&path).await?)
}

fn build_notifier(config: &NotifyConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.webhook_url {
        #[cfg(feature = "webhook-notify")]
        Some(url) => {
            info!(url = %url, "Delivering notifications through mail gateway");
            Ok(Arc::new(
                medinsight_server::notify::WebhookNotifier::new(url.clone())?,
            ))
        }
        #[cfg(not(feature = "webhook-notify"))]
        Some(_) => {
            warn!("notify.webhook_url is set but the webhook-notify feature is disabled; logging instead");
            Ok(Arc::new(LogNotifier))
        }
        None => {
            warn!("No notification gateway configured; codes are written to the debug log");
            Ok(Arc::new(LogNotifier))
        }
    }
}
