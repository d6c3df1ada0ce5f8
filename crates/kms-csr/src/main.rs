use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use kms_csr::{
    CsrBuilderFactory, KeyAlgorithm, KeyVersionName, KmsCsrConfig, LocalKms, SignatureScheme,
};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Pem,
    Json,
}

/// Builds certification requests signed through a KMS key version.
///
/// The key is served by an in-process KMS loaded from a PKCS#8 file, so the
/// CSR pipeline runs exactly as it would against the remote service.
#[derive(Parser)]
struct Args {
    /// PKCS#8 PEM private key backing the key version.
    #[clap(long, env = "KMS_CSR_PRIVATE_KEY")]
    private_key: PathBuf,
    /// KMS algorithm name, e.g. EC_SIGN_P256_SHA256.
    #[clap(long, env = "KMS_CSR_ALGORITHM", default_value = "EC_SIGN_P256_SHA256")]
    algorithm: KeyAlgorithm,
    #[clap(
        long,
        env = "KMS_CSR_KEY_NAME",
        default_value = "projects/local/locations/global/keyRings/csr/cryptoKeys/signer/cryptoKeyVersions/1"
    )]
    key_name: KeyVersionName,
    /// Subject distinguished name (RFC 4514). Repeat for several requests.
    #[clap(long = "subject", required = true)]
    subjects: Vec<String>,
    #[clap(long, env = "KMS_CSR_KEY_CACHE_TTL_SECS", default_value = "3600")]
    key_cache_ttl_secs: u64,
    #[clap(long, default_value = "pem")]
    output: OutputFormat,
}

#[derive(Debug, Serialize)]
struct CsrOutput {
    subject: String,
    key_name: KeyVersionName,
    algorithm: KeyAlgorithm,
    signature_algorithm: String,
    signature: String,
    pem: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kms_csr=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let pem = std::fs::read_to_string(&args.private_key)
        .with_context(|| format!("reading {}", args.private_key.display()))?;
    let kms = LocalKms::new();
    kms.import_pkcs8_pem(args.key_name.clone(), args.algorithm, &pem)?;

    let config = KmsCsrConfig {
        key_cache_ttl_secs: args.key_cache_ttl_secs,
    };
    let factory = Arc::new(CsrBuilderFactory::builder(kms).with_config(&config).build());

    // the KMS calls block, so each request is built on the blocking pool
    let tasks: Vec<_> = args
        .subjects
        .into_iter()
        .map(|subject| {
            let factory = factory.clone();
            let key_name = args.key_name.clone();
            let algorithm = args.algorithm;
            tokio::task::spawn_blocking(move || {
                build_request(&factory, key_name, algorithm, &subject)
            })
        })
        .collect();

    let mut outputs = Vec::with_capacity(tasks.len());
    for task in tasks {
        outputs.push(task.await.context("CSR task panicked")??);
    }

    match args.output {
        OutputFormat::Pem => {
            for output in &outputs {
                print!("{}", output.pem);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&outputs)?);
        }
    }
    Ok(())
}

fn build_request(
    factory: &CsrBuilderFactory<LocalKms>,
    key_name: KeyVersionName,
    algorithm: KeyAlgorithm,
    subject: &str,
) -> anyhow::Result<CsrOutput> {
    let request = factory
        .csr_builder()
        .with_key(key_name.clone())
        .for_subject(subject)?
        .build()
        .with_context(|| format!("building CSR for {subject}"))?;
    request
        .verify()
        .context("verifying freshly built CSR")?;

    let scheme = SignatureScheme::from_identifier(request.signature_algorithm())?;
    Ok(CsrOutput {
        subject: request.subject().to_string(),
        key_name,
        algorithm,
        signature_algorithm: scheme.to_string(),
        signature: hex::encode(request.signature()),
        pem: request.to_pem()?,
    })
}
