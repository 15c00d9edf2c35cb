//! Integration tests for Bale

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn bale() -> Command {
        cargo_bin_cmd!("bale")
    }

    #[test]
    fn help_displays() {
        bale()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("package bundling server"));
    }

    #[test]
    fn version_displays() {
        bale()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("bale"));
    }

    #[test]
    fn config_shows_defaults_when_missing() {
        let temp = TempDir::new().unwrap();
        bale()
            .arg("config")
            .env("BALE_CONFIG", temp.path().join("nope.toml"))
            .assert()
            .success()
            .stdout(predicate::str::contains("[server]"))
            .stdout(predicate::str::contains("registry.npmjs.org"));
    }

    #[test]
    fn config_init_writes_a_default_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        bale()
            .args(["config", "--init"])
            .env("BALE_CONFIG", &path)
            .assert()
            .success()
            .stdout(predicate::str::contains("wrote default config"));
        assert!(path.exists());

        bale()
            .args(["config", "--init"])
            .env("BALE_CONFIG", &path)
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_is_rejected_with_hint() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "server = not toml").unwrap();

        bale()
            .arg("config")
            .env("BALE_CONFIG", &path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn serve_fails_fast_on_a_bad_bind_address() {
        let temp = TempDir::new().unwrap();
        bale()
            .args(["serve", "--bind", "not-an-address"])
            .args(["--tmp-dir"])
            .arg(temp.path().join("scratch"))
            .env("BALE_CONFIG", temp.path().join("nope.toml"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("binding"));
    }
}

mod http_tests {
    use async_trait::async_trait;
    use bale::build::{BuildCoordinator, BuildRunner, BuildTask};
    use bale::cache::{ArtifactCache, CacheKey};
    use bale::config::Config;
    use bale::error::{BaleError, BaleResult};
    use bale::registry::RegistryClient;
    use bale::server::{router, AppState};
    use bytes::Bytes;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::io::Read;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    struct CountingRunner {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingRunner {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BuildRunner for CountingRunner {
        async fn run(&self, task: &BuildTask) -> BaleResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BaleError::bundle_failed(
                    &task.params.name,
                    "no <entry> found",
                ));
            }
            Ok(format!(
                "var bundle = '{}@{}';",
                task.params.name, task.params.version
            ))
        }
    }

    /// Registry stub serving canned package documents
    async fn spawn_registry(documents: Vec<(&str, serde_json::Value)>) -> String {
        use axum::extract::{Path, State};
        use axum::http::StatusCode;
        use axum::response::IntoResponse;
        use axum::routing::get;

        let documents: Arc<BTreeMap<String, serde_json::Value>> = Arc::new(
            documents
                .into_iter()
                .map(|(name, doc)| (name.to_string(), doc))
                .collect(),
        );

        async fn lookup(
            State(documents): State<Arc<BTreeMap<String, serde_json::Value>>>,
            Path(name): Path<String>,
        ) -> impl IntoResponse {
            match documents.get(&name) {
                Some(doc) => axum::Json(doc.clone()).into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            }
        }

        let app = axum::Router::new()
            .route("/:name", get(lookup))
            .with_state(documents);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn left_pad_doc() -> serde_json::Value {
        json!({
            "name": "left-pad",
            "dist-tags": { "latest": "1.3.0" },
            "versions": {
                "1.2.0": { "dist": { "tarball": "http://registry.test/left-pad-1.2.0.tgz" } },
                "1.3.0": { "dist": { "tarball": "http://registry.test/left-pad-1.3.0.tgz" } }
            }
        })
    }

    struct TestApp {
        base: String,
        state: AppState,
    }

    async fn spawn_app(
        registry_base: &str,
        runner: Arc<dyn BuildRunner>,
        configure: impl FnOnce(&mut Config),
    ) -> TestApp {
        let mut config = Config::default();
        config.server.public_dir = PathBuf::from("/nonexistent-public");
        configure(&mut config);

        let registry = RegistryClient::new(registry_base, Duration::from_secs(5)).unwrap();
        let cache = Arc::new(ArtifactCache::new(config.cache.max_bytes as usize));
        let coordinator = Arc::new(BuildCoordinator::new(cache, runner));
        let log_path = config.build.tmp_dir.join("log");
        let state = AppState::new(Arc::new(config), registry, coordinator, log_path);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone()).into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestApp {
            base: format!("http://{addr}"),
            state,
        }
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    fn gunzip(bytes: &[u8]) -> String {
        let mut out = String::new();
        flate2::read::GzDecoder::new(bytes)
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    #[tokio::test]
    async fn tag_requests_redirect_to_the_concrete_version() {
        let registry = spawn_registry(vec![("left-pad", left_pad_doc())]).await;
        let app = spawn_app(&registry, CountingRunner::ok(), |_| {}).await;

        let response = client()
            .get(format!("{}/left-pad", app.base))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 302);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "/left-pad@1.3.0"
        );
    }

    #[tokio::test]
    async fn range_requests_redirect_and_keep_deep_path_and_options() {
        let registry = spawn_registry(vec![("left-pad", left_pad_doc())]).await;
        let app = spawn_app(&registry, CountingRunner::ok(), |_| {}).await;

        // %5E is ^, the way clients send range tags
        let response = client()
            .get(format!(
                "{}/left-pad@%5E1.0.0/lib/extra?name=lp&format=es",
                app.base
            ))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 302);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "/left-pad@1.3.0/lib/extra?format=es&name=lp"
        );
    }

    #[tokio::test]
    async fn pinned_version_serves_the_gzipped_bundle() {
        let registry = spawn_registry(vec![("left-pad", left_pad_doc())]).await;
        let runner = CountingRunner::ok();
        let app = spawn_app(&registry, runner.clone(), |_| {}).await;

        let response = client()
            .get(format!("{}/left-pad@1.3.0", app.base))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let headers = response.headers().clone();
        assert_eq!(
            headers.get("content-type").unwrap(),
            "application/javascript; charset=utf-8"
        );
        assert_eq!(headers.get("content-encoding").unwrap(), "gzip");
        assert_eq!(headers.get("cache-control").unwrap(), "max-age=86400");

        let etag = headers.get("etag").unwrap().to_str().unwrap();
        assert_eq!(etag.len(), 18);
        assert!(etag.starts_with('"') && etag.ends_with('"'));

        let body = response.bytes().await.unwrap();
        assert_eq!(gunzip(&body), "var bundle = 'left-pad@1.3.0';");
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn repeat_requests_are_served_from_cache() {
        let registry = spawn_registry(vec![("left-pad", left_pad_doc())]).await;
        let runner = CountingRunner::ok();
        let app = spawn_app(&registry, runner.clone(), |_| {}).await;

        let url = format!("{}/left-pad@1.3.0", app.base);
        let first = client().get(&url).send().await.unwrap().bytes().await.unwrap();
        let second = client().get(&url).send().await.unwrap().bytes().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(runner.calls(), 1);
        assert_eq!(app.state.coordinator.cache().len(), 1);
    }

    #[tokio::test]
    async fn malformed_ids_get_a_plain_400() {
        let registry = spawn_registry(vec![]).await;
        let app = spawn_app(&registry, CountingRunner::ok(), |_| {}).await;

        let response = client()
            .get(format!("{}/@scope", app.base))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        assert_eq!(response.text().await.unwrap(), "Invalid module ID");
    }

    #[tokio::test]
    async fn unknown_format_option_is_rejected() {
        let registry = spawn_registry(vec![("left-pad", left_pad_doc())]).await;
        let app = spawn_app(&registry, CountingRunner::ok(), |_| {}).await;

        let response = client()
            .get(format!("{}/left-pad@1.3.0?format=amd", app.base))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        assert!(response.text().await.unwrap().contains("format=amd"));
    }

    #[tokio::test]
    async fn unknown_packages_are_the_callers_fault() {
        let registry = spawn_registry(vec![]).await;
        let app = spawn_app(&registry, CountingRunner::ok(), |_| {}).await;

        let response = client()
            .get(format!("{}/no-such-package", app.base))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        assert!(response.text().await.unwrap().contains("no-such-package"));
    }

    #[tokio::test]
    async fn build_failures_render_the_error_page() {
        let registry = spawn_registry(vec![("left-pad", left_pad_doc())]).await;
        let app = spawn_app(&registry, CountingRunner::failing(), |_| {}).await;

        let response = client()
            .get(format!("{}/left-pad@1.3.0", app.base))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 500);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("something went wrong"));
        // the failure message is escaped into the page
        assert!(body.contains("&lt;entry&gt;"));
        assert!(!body.contains("no <entry> found"));
    }

    #[tokio::test]
    async fn legacy_bundle_prefix_redirects_to_the_stripped_url() {
        let registry = spawn_registry(vec![]).await;
        let app = spawn_app(&registry, CountingRunner::ok(), |_| {}).await;

        let response = client()
            .get(format!("{}/bundle/left-pad@1.3.0?name=lp", app.base))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 302);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "/left-pad@1.3.0?name=lp"
        );
    }

    #[tokio::test]
    async fn index_page_interpolates_the_version() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("index.html"),
            "<html><body>demo __VERSION__</body></html>",
        )
        .unwrap();

        let registry = spawn_registry(vec![]).await;
        let public = temp.path().to_path_buf();
        let app = spawn_app(&registry, CountingRunner::ok(), move |config| {
            config.server.public_dir = public;
        })
        .await;

        let body = client()
            .get(format!("{}/", app.base))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains(&format!("demo {}", env!("CARGO_PKG_VERSION"))));
        assert!(!body.contains("__VERSION__"));
    }

    #[tokio::test]
    async fn static_assets_are_served_with_their_own_max_age() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("style.css"), "body { margin: 0 }").unwrap();

        let registry = spawn_registry(vec![]).await;
        let public = temp.path().to_path_buf();
        let app = spawn_app(&registry, CountingRunner::ok(), move |config| {
            config.server.public_dir = public;
        })
        .await;

        let response = client()
            .get(format!("{}/style.css", app.base))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("cache-control").unwrap(), "max-age=600");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/css; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn log_endpoint_filters_by_package_tag() {
        let temp = TempDir::new().unwrap();
        let log_path = temp.path().join("log");
        std::fs::write(
            &log_path,
            "INFO [left-pad] fetching tarball\nINFO [other] unrelated\nINFO [left-pad] minifying\n",
        )
        .unwrap();

        let registry = spawn_registry(vec![]).await;
        let tmp_dir = temp.path().to_path_buf();
        let app = spawn_app(&registry, CountingRunner::ok(), move |config| {
            config.build.tmp_dir = tmp_dir;
        })
        .await;

        let all = client()
            .get(format!("{}/_log", app.base))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(all.contains("[other] unrelated"));

        let filtered = client()
            .get(format!("{}/_log?filter=left-pad", app.base))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(filtered.contains("[left-pad] fetching tarball"));
        assert!(filtered.contains("[left-pad] minifying"));
        assert!(!filtered.contains("unrelated"));
    }

    #[tokio::test]
    async fn cache_endpoint_lists_entries() {
        let registry = spawn_registry(vec![]).await;
        let app = spawn_app(&registry, CountingRunner::ok(), |_| {}).await;

        let key = CacheKey::build("left-pad", "1.3.0", None, &BTreeMap::new());
        app.state
            .coordinator
            .cache()
            .set(key.clone(), Bytes::from_static(b"0123456789"));

        let body = client()
            .get(format!("{}/_cache", app.base))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains(key.as_str()));
        assert!(body.contains("<td>10</td>"));
        assert!(body.contains("1 entries"));
    }

    #[tokio::test]
    async fn debug_endpoints_can_be_disabled() {
        let registry = spawn_registry(vec![]).await;
        let app = spawn_app(&registry, CountingRunner::ok(), |config| {
            config.server.debug_endpoints = false;
        })
        .await;

        for path in ["/_log", "/_cache"] {
            let response = client()
                .get(format!("{}{path}", app.base))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 404, "{path} should be gated");
        }
    }
}

#[cfg(unix)]
mod worker_tests {
    use bale::build::{BuildParams, BuildRunner, BuildSettings, BuildTask, WorkerSupervisor};
    use bale::cache::CacheKey;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn make_tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    async fn spawn_tarball_server(bytes: Vec<u8>) -> String {
        use axum::extract::State;
        use axum::routing::get;

        async fn tarball(State(bytes): State<std::sync::Arc<Vec<u8>>>) -> Vec<u8> {
            bytes.as_ref().clone()
        }

        let app = axum::Router::new()
            .route("/package.tgz", get(tarball))
            .with_state(std::sync::Arc::new(bytes));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/package.tgz")
    }

    fn supervisor() -> WorkerSupervisor {
        WorkerSupervisor::new(
            vec![env!("CARGO_BIN_EXE_bale").to_string(), "worker".to_string()],
            Duration::from_secs(60),
        )
    }

    fn task(tmp_dir: &TempDir, tarball_url: String, settings_tweak: impl FnOnce(&mut BuildSettings)) -> BuildTask {
        let mut settings = BuildSettings {
            tmp_dir: tmp_dir.path().to_path_buf(),
            fetch_timeout_secs: 10,
            install_command: sh("true"),
            install_env: BTreeMap::new(),
            link_command: sh("false"),
            trace_command: sh("false"),
            minify_command: sh("cat"),
        };
        settings_tweak(&mut settings);

        let key = CacheKey::build("tiny", "1.0.0", None, &BTreeMap::new());
        BuildTask {
            params: BuildParams {
                key: key.as_str().to_string(),
                name: "tiny".to_string(),
                version: "1.0.0".to_string(),
                tarball_url,
                deep_path: None,
                options: BTreeMap::new(),
                settings,
            },
            key,
        }
    }

    #[tokio::test]
    async fn worker_builds_a_commonjs_package_end_to_end() {
        let tarball = make_tarball(&[
            (
                "package/package.json",
                r#"{"name":"tiny","main":"index.js","scripts":{"prepare":"exit 1"}}"#,
            ),
            ("package/index.js", "module.exports = 42;\n"),
        ]);
        let url = spawn_tarball_server(tarball).await;

        let tmp = TempDir::new().unwrap();
        let task = task(&tmp, url, |settings| {
            settings.trace_command = sh(r#"printf 'traced %s' "$(basename "$0")""#);
        });

        let code = supervisor().run(&task).await.unwrap();
        assert_eq!(code, "traced index.js");

        // scratch cleanup runs after the terminal message, so it races
        // the supervisor's return briefly
        let scratch = tmp.path().join(task.key.as_str());
        for _ in 0..100 {
            if !scratch.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn worker_links_an_es_module_and_minifies() {
        let tarball = make_tarball(&[
            (
                "package/package.json",
                r#"{"name":"tiny","module":"index.mjs"}"#,
            ),
            ("package/index.mjs", "export default 42;\n"),
        ]);
        let url = spawn_tarball_server(tarball).await;

        let tmp = TempDir::new().unwrap();
        let task = task(&tmp, url, |settings| {
            settings.link_command = sh(r#"printf 'linked %s as %s' "$2" "$4""#);
            settings.minify_command = sh("tr a-z A-Z");
        });

        let code = supervisor().run(&task).await.unwrap();
        assert_eq!(code, "LINKED UMD AS TINY");
    }

    #[tokio::test]
    async fn worker_reports_install_failures_as_errors() {
        let tarball = make_tarball(&[
            ("package/package.json", r#"{"name":"tiny","main":"index.js"}"#),
            ("package/index.js", "module.exports = 1;\n"),
        ]);
        let url = spawn_tarball_server(tarball).await;

        let tmp = TempDir::new().unwrap();
        let task = task(&tmp, url, |settings| {
            settings.install_command = sh("echo ERESOLVE unable to resolve >&2; exit 1");
        });

        let err = supervisor().run(&task).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("dependency install failed"), "{message}");
    }

    #[tokio::test]
    async fn worker_reports_unfetchable_tarballs() {
        let tmp = TempDir::new().unwrap();
        // nothing listens on this port
        let task = task(&tmp, "http://127.0.0.1:9/package.tgz".to_string(), |_| {});

        let err = supervisor().run(&task).await.unwrap_err();
        assert!(err.to_string().contains("build failed"));
    }
}
