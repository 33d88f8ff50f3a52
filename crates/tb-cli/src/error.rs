#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("no DigitalOcean token: pass --token or set DIGITALOCEAN_TOKEN")]
    MissingToken,

    #[error(transparent)]
    Deploy(#[from] tb_deploy::DeployError),

    #[error("infra error: {0}")]
    Infra(#[from] tb_infra::Error),

    #[error("status server: {0}")]
    StatusServer(#[source] std::io::Error),

    #[error("could not print report: {0}")]
    Report(#[from] serde_json::Error),
}
