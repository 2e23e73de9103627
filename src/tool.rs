use async_trait::async_trait;

use omg_micro_command::{CommandClient, CommandError};

/// External tool that builds the service image and runs its actions.
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Runs `<tool> build`; reports whether the build succeeded.
    async fn build(&self) -> Result<bool, CommandError>;

    /// Runs `<tool> run <action> key=value ...` and returns the tool's raw stdout.
    async fn run(&self, action: &str, args: &[(String, String)]) -> Result<String, CommandError>;
}

/// Renders `(key, value)` pairs as `key=value` command-line tokens.
pub fn key_value_args(args: &[(String, String)]) -> Vec<String> {
    args.iter().map(|(key, value)| format!("{key}={value}")).collect()
}

#[async_trait]
impl BuildTool for CommandClient {
    async fn build(&self) -> Result<bool, CommandError> {
        let output = self.invoke(["build"]).await?;
        if output.success {
            tracing::info!("image build succeeded");
        } else {
            tracing::warn!(status = ?output.status, stderr = %output.stderr.trim(), "image build failed");
        }
        Ok(output.success)
    }

    async fn run(&self, action: &str, args: &[(String, String)]) -> Result<String, CommandError> {
        let mut argv = vec!["run".to_owned(), action.to_owned()];
        argv.extend(key_value_args(args));

        let output = self.invoke(argv).await?.into_result()?;
        tracing::debug!(action, bytes = output.stdout.len(), "action finished");
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_key_value_tokens() {
        let args = vec![
            ("prefix".to_owned(), "ab".to_owned()),
            ("uri".to_owned(), "https://x.test/?a=b".to_owned()),
        ];
        assert_eq!(key_value_args(&args), ["prefix=ab", "uri=https://x.test/?a=b"]);
        assert!(key_value_args(&[]).is_empty());
    }

    #[tokio::test]
    async fn unavailable_tool_reports_error() {
        let client = CommandClient::unavailable("no tool in tests");
        assert!(matches!(
            BuildTool::build(&client).await,
            Err(CommandError::Unavailable(_))
        ));
        assert!(matches!(
            BuildTool::run(&client, "work", &[]).await,
            Err(CommandError::Unavailable(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn build_maps_exit_status_to_bool() {
        use omg_micro_command::ToolEndpoint;
        use std::path::PathBuf;

        let ok = CommandClient::new(ToolEndpoint::Program(PathBuf::from("true")));
        assert!(BuildTool::build(&ok).await.unwrap());

        let failing = CommandClient::new(ToolEndpoint::Program(PathBuf::from("false")));
        assert!(!BuildTool::build(&failing).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_passes_action_and_arguments() {
        use omg_micro_command::ToolEndpoint;
        use std::path::PathBuf;

        // `echo run work prefix=ab` prints the argv it was handed.
        let client = CommandClient::new(ToolEndpoint::Program(PathBuf::from("echo")));
        let stdout = BuildTool::run(&client, "work", &[("prefix".into(), "ab".into())])
            .await
            .unwrap();
        assert_eq!(stdout, "run work prefix=ab\n");

        let failing = CommandClient::new(ToolEndpoint::Program(PathBuf::from("false")));
        assert!(matches!(
            BuildTool::run(&failing, "work", &[]).await,
            Err(CommandError::CommandFailure { .. })
        ));
    }
}
