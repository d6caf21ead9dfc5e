//! Service reload after channel-list changes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use mu_core::ReloadError;
use mu_core::config::ReloadConfig;

use crate::process::ProcessRunner;
use crate::traits::HttpClient;

const WEB_IF_TIMEOUT: Duration = Duration::from_secs(10);

/// The running service's channel database.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceDatabase: Send + Sync {
    async fn reload_service_list(&self) -> Result<(), ReloadError>;
    async fn reload_bouquets(&self) -> Result<(), ReloadError>;
}

/// Reloads through OpenWebif's `servicelistreload` endpoint.
pub struct WebIfServiceDatabase {
    http: Arc<dyn HttpClient>,
    base_url: String,
}

impl WebIfServiceDatabase {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn request(&self, mode: u8, operation: &str) -> Result<(), ReloadError> {
        let url = format!("{}/web/servicelistreload?mode={mode}", self.base_url);
        debug!(url, "requesting reload");

        let body = self
            .http
            .get(&url, WEB_IF_TIMEOUT)
            .await
            .map_err(|e| ReloadError::Service {
                operation: operation.to_string(),
                message: e.to_string(),
            })?;

        let body = String::from_utf8_lossy(&body).to_lowercase();
        if body.contains("<e2state>false</e2state>") {
            return Err(ReloadError::Service {
                operation: operation.to_string(),
                message: "web interface reported failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceDatabase for WebIfServiceDatabase {
    async fn reload_service_list(&self) -> Result<(), ReloadError> {
        self.request(1, "service list reload").await
    }

    async fn reload_bouquets(&self) -> Result<(), ReloadError> {
        self.request(2, "bouquet reload").await
    }
}

/// Reloads by running configured commands. An empty command is skipped.
pub struct CommandServiceDatabase {
    runner: Arc<dyn ProcessRunner>,
    service_list: Vec<String>,
    bouquets: Vec<String>,
    timeout: Duration,
}

impl CommandServiceDatabase {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        service_list: Vec<String>,
        bouquets: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            service_list,
            bouquets,
            timeout,
        }
    }

    async fn run(&self, command: &[String], operation: &str) -> Result<(), ReloadError> {
        let Some((program, args)) = command.split_first() else {
            debug!(operation, "no reload command configured");
            return Ok(());
        };

        let output = self
            .runner
            .run(program, args, self.timeout)
            .await
            .map_err(|e| ReloadError::Service {
                operation: operation.to_string(),
                message: e.to_string(),
            })?;

        if !output.success() {
            return Err(ReloadError::Service {
                operation: operation.to_string(),
                message: format!(
                    "{program} exited with {:?}: {}",
                    output.code,
                    output.stderr.trim()
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceDatabase for CommandServiceDatabase {
    async fn reload_service_list(&self) -> Result<(), ReloadError> {
        self.run(&self.service_list, "service list reload").await
    }

    async fn reload_bouquets(&self) -> Result<(), ReloadError> {
        self.run(&self.bouquets, "bouquet reload").await
    }
}

#[derive(Clone)]
pub struct ReloadNotifier {
    db: Arc<dyn ServiceDatabase>,
}

impl ReloadNotifier {
    pub fn new(db: Arc<dyn ServiceDatabase>) -> Self {
        Self { db }
    }

    /// Build the collaborator selected by `config`.
    pub fn from_config(
        config: &ReloadConfig,
        http: Arc<dyn HttpClient>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let db: Arc<dyn ServiceDatabase> = match config {
            ReloadConfig::WebIf { base_url } => {
                Arc::new(WebIfServiceDatabase::new(http, base_url.clone()))
            }
            ReloadConfig::Commands {
                service_list,
                bouquets,
                timeout_secs,
            } => Arc::new(CommandServiceDatabase::new(
                runner,
                service_list.clone(),
                bouquets.clone(),
                Duration::from_secs(*timeout_secs),
            )),
        };
        Self::new(db)
    }

    /// Reload the service list, then the bouquets.
    pub async fn reload(&self) -> Result<(), ReloadError> {
        self.db.reload_service_list().await?;
        self.db.reload_bouquets().await?;
        info!("service lists reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{MockProcessRunner, ProcessOutput};
    use crate::traits::ReqwestHttpClient;
    use mockall::Sequence;
    use mu_core::ProcessError;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn notifier_reloads_service_list_then_bouquets() {
        let mut seq = Sequence::new();
        let mut db = MockServiceDatabase::new();
        db.expect_reload_service_list()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        db.expect_reload_bouquets()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        ReloadNotifier::new(Arc::new(db)).reload().await.unwrap();
    }

    #[tokio::test]
    async fn notifier_stops_at_first_failure() {
        let mut db = MockServiceDatabase::new();
        db.expect_reload_service_list().returning(|| {
            Err(ReloadError::Service {
                operation: "service list reload".to_string(),
                message: "down".to_string(),
            })
        });
        db.expect_reload_bouquets().never();

        let err = ReloadNotifier::new(Arc::new(db)).reload().await.unwrap_err();
        assert!(matches!(err, ReloadError::Service { .. }));
    }

    #[tokio::test]
    async fn web_if_requests_both_modes() {
        let mock_server = MockServer::start().await;
        for mode in ["1", "2"] {
            Mock::given(method("GET"))
                .and(path("/web/servicelistreload"))
                .and(query_param("mode", mode))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string("<e2simplexmlresult><e2state>True</e2state></e2simplexmlresult>"),
                )
                .expect(1)
                .mount(&mock_server)
                .await;
        }

        let db = WebIfServiceDatabase::new(
            Arc::new(ReqwestHttpClient::new()),
            format!("{}/", mock_server.uri()),
        );
        ReloadNotifier::new(Arc::new(db)).reload().await.unwrap();
    }

    #[tokio::test]
    async fn web_if_reported_failure_is_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<e2simplexmlresult><e2state>False</e2state></e2simplexmlresult>"),
            )
            .mount(&mock_server)
            .await;

        let db = WebIfServiceDatabase::new(Arc::new(ReqwestHttpClient::new()), mock_server.uri());
        let err = db.reload_service_list().await.unwrap_err();
        assert!(matches!(err, ReloadError::Service { .. }));
    }

    #[tokio::test]
    async fn web_if_unreachable_is_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let db = WebIfServiceDatabase::new(Arc::new(ReqwestHttpClient::new()), mock_server.uri());
        assert!(db.reload_bouquets().await.is_err());
    }

    #[tokio::test]
    async fn commands_run_through_process_runner() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|program, args, _| program == "wget" && args.len() == 2)
            .times(2)
            .returning(|_, _, _| {
                Ok(ProcessOutput {
                    code: Some(0),
                    ..Default::default()
                })
            });

        let command = vec![
            "wget".to_string(),
            "-qO-".to_string(),
            "http://127.0.0.1/x".to_string(),
        ];
        let db = CommandServiceDatabase::new(
            Arc::new(runner),
            command.clone(),
            command,
            Duration::from_secs(5),
        );
        ReloadNotifier::new(Arc::new(db)).reload().await.unwrap();
    }

    #[tokio::test]
    async fn command_failure_and_empty_command() {
        let mut runner = MockProcessRunner::new();
        runner.expect_run().times(1).returning(|_, _, _| {
            Ok(ProcessOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "no such service\n".to_string(),
            })
        });

        let db = CommandServiceDatabase::new(
            Arc::new(runner),
            vec!["reload".to_string()],
            Vec::new(),
            Duration::from_secs(5),
        );

        assert!(db.reload_bouquets().await.is_ok());
        let err = db.reload_service_list().await.unwrap_err();
        assert!(err.to_string().contains("no such service"));
    }

    #[tokio::test]
    async fn spawn_failure_is_reload_error() {
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(|program, _, _| {
            Err(ProcessError::Spawn {
                program: program.to_string(),
                message: "not found".to_string(),
            })
        });

        let db = CommandServiceDatabase::new(
            Arc::new(runner),
            vec!["missing".to_string()],
            Vec::new(),
            Duration::from_secs(5),
        );
        assert!(db.reload_service_list().await.is_err());
    }

    #[test]
    fn builds_collaborator_from_config() {
        let http: Arc<dyn HttpClient> = Arc::new(crate::traits::MockHttpClient::new());
        let runner: Arc<dyn ProcessRunner> = Arc::new(MockProcessRunner::new());

        let _ = ReloadNotifier::from_config(&ReloadConfig::default(), http.clone(), runner.clone());
        let _ = ReloadNotifier::from_config(
            &ReloadConfig::Commands {
                service_list: vec!["true".to_string()],
                bouquets: Vec::new(),
                timeout_secs: 3,
            },
            http,
            runner,
        );
    }
}
