//! Isolated build worker
//!
//! One worker process runs exactly one build and exits. It announces
//! `Ready` on stdout, waits for its `Start` order on stdin, then works
//! through fetch, extract, install, bundle, and minify, streaming
//! progress as `Info` lines. Success or failure, it ends with a single
//! terminal message and clears its scratch directory best-effort.

use crate::build::bundle::Bundler;
use crate::build::entry::{legal_identifier, resolve_entry, PackageManifest};
use crate::build::exec::run_command;
use crate::build::protocol::{BuildParams, BuildSettings, WorkerMessage};
use crate::build::report::Reporter;
use crate::error::{BaleError, BaleResult};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Protocol loop for the `bale worker` subcommand.
pub async fn run() -> BaleResult<()> {
    let boot = Reporter::stdout("worker");
    boot.send(&WorkerMessage::Ready);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| BaleError::io("reading worker stdin", e))?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Only the supervisor writes here; anything that is not a start
        // order is dropped.
        let Ok(WorkerMessage::Start { params }) = serde_json::from_str(line) else {
            continue;
        };

        let reporter = Reporter::stdout(&params.name);
        let scratch = params.settings.tmp_dir.join(&params.key);

        let terminal = match create_bundle(&params, &scratch, &reporter).await {
            Ok(code) => WorkerMessage::Result { code },
            Err(err) => WorkerMessage::Error {
                message: err.to_string(),
                trace: error_trace(&err),
            },
        };
        // Terminal first so no waiter is held up by cleanup; the
        // supervisor leaves a grace window before reaping.
        reporter.send(&terminal);
        let _ = fs::remove_dir_all(&scratch).await;
        break;
    }
    Ok(())
}

/// The build pipeline proper.
async fn create_bundle(
    params: &BuildParams,
    scratch: &Path,
    reporter: &Reporter,
) -> BaleResult<String> {
    let pkg_dir = scratch.join("package");

    fs::create_dir_all(scratch)
        .await
        .map_err(|e| BaleError::io(format!("creating {}", scratch.display()), e))?;

    fetch_tarball(&params.tarball_url, &params.settings, scratch, reporter).await?;
    extract_tarball(scratch, reporter).await?;
    let manifest = sanitize_manifest(&pkg_dir).await?;
    install_dependencies(&params.settings, &params.name, &pkg_dir, &manifest, reporter).await?;

    let entry = resolve_entry(&pkg_dir, &manifest, params.deep_path.as_deref(), &params.name).await?;

    let global_name = match params.options.get("name") {
        Some(name) => name.clone(),
        None => legal_identifier(manifest.name.as_deref().unwrap_or(&params.name)),
    };
    let format = params
        .options
        .get("format")
        .map(String::as_str)
        .unwrap_or("umd");

    let bundler = Bundler::new(&params.settings, reporter);
    let code = bundler.produce(&pkg_dir, &entry, &global_name, format).await?;
    Ok(bundler.minify(&pkg_dir, code).await)
}

/// Download the version's source archive into the scratch directory.
async fn fetch_tarball(
    url: &str,
    settings: &BuildSettings,
    scratch: &Path,
    reporter: &Reporter,
) -> BaleResult<()> {
    reporter.info(format!("fetching {url}"));

    let timeout = std::time::Duration::from_secs(settings.fetch_timeout_secs);
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BaleError::Internal(format!("building http client: {e}")))?;

    let bytes = match client.get(url).send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => response.bytes().await.map_err(|e| fetch_error(url, settings, e))?,
        Err(e) => return Err(fetch_error(url, settings, e)),
    };

    fs::write(scratch.join("package.tgz"), &bytes)
        .await
        .map_err(|e| BaleError::io("writing package.tgz", e))
}

fn fetch_error(url: &str, settings: &BuildSettings, err: reqwest::Error) -> BaleError {
    if err.is_timeout() {
        BaleError::FetchTimeout {
            url: url.to_string(),
            secs: settings.fetch_timeout_secs,
        }
    } else {
        BaleError::FetchFailed {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Unpack `package.tgz`; registry tarballs place the source under
/// `package/`.
async fn extract_tarball(scratch: &Path, reporter: &Reporter) -> BaleResult<()> {
    reporter.info(format!("extracting to {}", scratch.join("package").display()));

    let dir = scratch.to_path_buf();
    tokio::task::spawn_blocking(move || -> BaleResult<()> {
        let file = std::fs::File::open(dir.join("package.tgz"))
            .map_err(|e| BaleError::io("opening package.tgz", e))?;
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
        archive
            .unpack(&dir)
            .map_err(|e| BaleError::io("extracting package.tgz", e))
    })
    .await
    .map_err(|e| BaleError::Internal(format!("extract task failed: {e}")))?
}

/// Clear lifecycle scripts from package.json before anything installs,
/// and hand back the fields the rest of the pipeline needs.
async fn sanitize_manifest(pkg_dir: &Path) -> BaleResult<PackageManifest> {
    let path = pkg_dir.join("package.json");
    let raw = fs::read_to_string(&path)
        .await
        .map_err(|e| BaleError::io("reading package.json", e))?;

    let mut value: serde_json::Value = serde_json::from_str(&raw)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("scripts".to_string(), serde_json::json!({}));
    }
    fs::write(&path, serde_json::to_vec_pretty(&value)?)
        .await
        .map_err(|e| BaleError::io("writing sanitized package.json", e))?;

    Ok(serde_json::from_value(value)?)
}

/// Production install, then each peer dependency one at a time. Output
/// lines from the installer are forwarded as progress.
async fn install_dependencies(
    settings: &BuildSettings,
    package: &str,
    pkg_dir: &Path,
    manifest: &PackageManifest,
    reporter: &Reporter,
) -> BaleResult<()> {
    reporter.info(format!("running {}", settings.install_command.join(" ")));
    run_install(&settings.install_command, settings, package, pkg_dir, reporter).await?;

    for (name, range) in &manifest.peer_dependencies {
        reporter.info(format!("installing peer dependency {name}@{range}"));
        let mut argv = settings.install_command.clone();
        argv.push(format!("{name}@{range}"));
        run_install(&argv, settings, package, pkg_dir, reporter).await?;
    }
    Ok(())
}

async fn run_install(
    argv: &[String],
    settings: &BuildSettings,
    package: &str,
    pkg_dir: &Path,
    reporter: &Reporter,
) -> BaleResult<()> {
    let out = run_command(argv, pkg_dir, &settings.install_env, None).await?;
    for line in out.lines() {
        reporter.info(line);
    }
    if !out.success {
        return Err(BaleError::InstallFailed {
            package: package.to_string(),
            detail: out.stderr_tail(),
        });
    }
    Ok(())
}

/// Flatten an error's source chain into one line for the `Error` trace.
fn error_trace(err: &BaleError) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
