//! Bundling strategies
//!
//! Two external bundlers cover the package ecosystem between them. ES
//! modules go through the static linker (a rollup-style CLI); everything
//! else goes through the dynamic tracer (a browserify-style CLI). The
//! linker's output can still fall short in two ways it reports late:
//! leftover CommonJS requires from non-module dependencies, and
//! code-splitting output that cannot be a single file. Both reroute to
//! the tracer rather than failing the build.

use crate::build::entry::is_module_source;
use crate::build::exec::run_command;
use crate::build::protocol::BuildSettings;
use crate::build::report::Reporter;
use crate::error::{BaleError, BaleResult};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

const INTERMEDIATE_FILE: &str = "__intermediate.js";

pub struct Bundler<'a> {
    settings: &'a BuildSettings,
    reporter: &'a Reporter,
}

impl<'a> Bundler<'a> {
    pub fn new(settings: &'a BuildSettings, reporter: &'a Reporter) -> Self {
        Self { settings, reporter }
    }

    /// Produce a single-file bundle for `entry`, exposed as `global_name`.
    pub async fn produce(
        &self,
        pkg_dir: &Path,
        entry: &Path,
        global_name: &str,
        format: &str,
    ) -> BaleResult<String> {
        let source = fs::read_to_string(entry).await.map_err(|e| {
            BaleError::io(format!("reading entry {}", entry.display()), e)
        })?;

        if is_module_source(&source) {
            self.reporter.info("module syntax found, linking statically");
            self.link(pkg_dir, entry, global_name, format).await
        } else {
            self.reporter.info("no module syntax found, tracing requires");
            self.trace(pkg_dir, entry, global_name).await
        }
    }

    /// Static linking. Falls back to the tracer when the linked output
    /// still requires non-module dependencies or the linker wants to
    /// split chunks.
    async fn link(
        &self,
        pkg_dir: &Path,
        entry: &Path,
        global_name: &str,
        format: &str,
    ) -> BaleResult<String> {
        let mut argv = self.settings.link_command.clone();
        argv.extend([
            entry.display().to_string(),
            "--format".to_string(),
            format.to_string(),
            "--name".to_string(),
            global_name.to_string(),
            "--silent".to_string(),
        ]);

        let out = run_command(&argv, pkg_dir, &BTreeMap::new(), None).await?;
        if !out.success {
            let reason = out.stderr_tail();
            if reason.contains("chunk") {
                self.reporter
                    .info("linker wants to split chunks, tracing the entry instead");
                return self.trace(pkg_dir, entry, global_name).await;
            }
            return Err(BaleError::bundle_failed(self.reporter.package(), reason));
        }

        if format == "umd" && out.stdout.contains("require(") {
            self.reporter
                .info("non-module dependencies remain, handing off to the tracer");
            let intermediate = self.write_intermediate(pkg_dir, entry).await?;
            return self.trace(pkg_dir, &intermediate, global_name).await;
        }

        self.reporter.info("bundled with the static linker");
        Ok(out.stdout)
    }

    /// Re-run the linker in plain CommonJS mode so the tracer can take
    /// over from a partially-linked file.
    async fn write_intermediate(
        &self,
        pkg_dir: &Path,
        entry: &Path,
    ) -> BaleResult<std::path::PathBuf> {
        let intermediate = pkg_dir.join(INTERMEDIATE_FILE);
        let mut argv = self.settings.link_command.clone();
        argv.extend([
            entry.display().to_string(),
            "--format".to_string(),
            "cjs".to_string(),
            "--file".to_string(),
            intermediate.display().to_string(),
            "--silent".to_string(),
        ]);

        let out = run_command(&argv, pkg_dir, &BTreeMap::new(), None).await?;
        if !out.success {
            return Err(BaleError::bundle_failed(
                self.reporter.package(),
                out.stderr_tail(),
            ));
        }
        Ok(intermediate)
    }

    /// Dynamic tracing, the catch-all strategy
    async fn trace(&self, pkg_dir: &Path, entry: &Path, global_name: &str) -> BaleResult<String> {
        let mut argv = self.settings.trace_command.clone();
        argv.extend([
            entry.display().to_string(),
            "--standalone".to_string(),
            global_name.to_string(),
        ]);

        let out = run_command(&argv, pkg_dir, &BTreeMap::new(), None).await?;
        if !out.success {
            return Err(BaleError::bundle_failed(
                self.reporter.package(),
                out.stderr_tail(),
            ));
        }

        self.reporter.info("bundled with the dynamic tracer");
        Ok(out.stdout)
    }

    /// Minify `code`, degrading to the unminified source if the minifier
    /// misbehaves. A broken minifier must never sink a build.
    pub async fn minify(&self, pkg_dir: &Path, code: String) -> String {
        self.reporter.info("minifying");

        match run_command(
            &self.settings.minify_command,
            pkg_dir,
            &BTreeMap::new(),
            Some(code.as_bytes()),
        )
        .await
        {
            Ok(out) if out.success => out.stdout,
            Ok(out) => {
                self.reporter
                    .info(format!("minification failed: {}", out.stderr_tail()));
                code
            }
            Err(err) => {
                self.reporter.info(format!("minification failed: {err}"));
                code
            }
        }
    }
}
