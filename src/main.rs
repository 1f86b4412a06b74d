use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use wsclient::{AuthenticatedClient, Body, ClientConfig, EndpointRequest};

/// wsclient - call a web service secured by OAuth2 client credentials
///
/// A bearer token is requested on the first call and renewed once when the
/// service reports it expired. The decoded JSON response is printed on stdout.
///
/// Examples:
///   wsclient --base-url https://ws.example.org get videos/1
///   wsclient --host 127.0.0.1 --port 3001 post videos --field title=Demo
#[derive(Parser, Debug)]
#[command(author, version = env!("WSCLIENT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Web service base URL (takes precedence over --host)
    #[arg(long, env = "WSCLIENT_BASE_URL", value_name = "URL", global = true)]
    base_url: Option<String>,

    /// Web service host without protocol, reached over plain HTTP
    #[arg(long, env = "WSCLIENT_HOST", value_name = "HOST", global = true)]
    host: Option<String>,

    /// Web service port, used with --host
    #[arg(long, env = "WSCLIENT_PORT", value_name = "PORT", global = true)]
    port: Option<u16>,

    #[arg(long, env = "WSCLIENT_CLIENT_ID", value_name = "ID", global = true)]
    client_id: Option<String>,

    #[arg(
        long,
        env = "WSCLIENT_CLIENT_SECRET",
        value_name = "SECRET",
        global = true,
        hide_env_values = true
    )]
    client_secret: Option<String>,

    /// PEM file with the certificate the web service is trusted with
    #[arg(long, env = "WSCLIENT_CERTIFICATE", value_name = "PATH", global = true)]
    certificate: Option<PathBuf>,

    /// Total timeout per call, in seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    timeout: Option<u64>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// GET an endpoint
    Get(EndpointArgs),

    /// POST a raw body or form fields to an endpoint
    Post(BodyArgs),

    /// PUT a raw body or form fields to an endpoint
    Put(BodyArgs),

    /// DELETE an endpoint
    Delete(EndpointArgs),

    /// Request a token and report whether the credentials are accepted
    Token,
}

#[derive(clap::Args, Debug)]
struct EndpointArgs {
    /// Endpoint path relative to the base URL (e.g. videos/1)
    #[arg(value_name = "ENDPOINT")]
    endpoint: String,

    /// Extra request header
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE", value_parser = parse_header)]
    headers: Vec<(HeaderName, HeaderValue)>,
}

#[derive(clap::Args, Debug)]
struct BodyArgs {
    #[command(flatten)]
    target: EndpointArgs,

    /// Raw request body, sent as-is
    #[arg(long, value_name = "BODY", conflicts_with = "fields")]
    data: Option<String>,

    /// Form field, sends the body as multipart/form-data (repeatable)
    #[arg(long = "field", value_name = "KEY=VALUE", value_parser = parse_field)]
    fields: Vec<(String, String)>,
}

impl Cli {
    fn config(&self) -> ClientConfig {
        let client_id = self.client_id.clone().unwrap_or_default();
        let client_secret = self.client_secret.clone().unwrap_or_default();

        let mut config = match (&self.base_url, &self.host) {
            (Some(base_url), _) => ClientConfig::new(base_url.as_str(), client_id, client_secret),
            (None, host) => ClientConfig::from_host(
                host.as_deref().unwrap_or_default(),
                self.port,
                client_id,
                client_secret,
            ),
        };

        if let Some(path) = &self.certificate {
            config = config.with_certificate(path);
        }
        if let Some(seconds) = self.timeout {
            config = config.with_timeout(Duration::from_secs(seconds));
        }
        config
    }
}

impl BodyArgs {
    fn body(&self) -> Body {
        match &self.data {
            Some(raw) => Body::Raw(raw.clone()),
            None if !self.fields.is_empty() => Body::Form(self.fields.clone()),
            None => Body::Empty,
        }
    }
}

fn parse_header(s: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid header '{}'. Expected 'Name: value'.", s))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .with_context(|| format!("Invalid header name in '{}'", s))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("Invalid header value in '{}'", s))?;
    Ok((name, value))
}

fn parse_field(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => anyhow::bail!("Invalid field '{}'. Expected 'key=value'.", s),
    }
}

fn endpoint_request(method: Method, args: &EndpointArgs) -> EndpointRequest {
    let headers: HeaderMap = args.headers.iter().cloned().collect();
    EndpointRequest::new(method, args.endpoint.as_str()).headers(headers)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let client = AuthenticatedClient::new(cli.config())?;

    let request = match &cli.command {
        Commands::Get(args) => endpoint_request(Method::GET, args),
        Commands::Delete(args) => endpoint_request(Method::DELETE, args),
        Commands::Post(args) => endpoint_request(Method::POST, &args.target).body(args.body()),
        Commands::Put(args) => endpoint_request(Method::PUT, &args.target).body(args.body()),
        Commands::Token => {
            client.authenticate().await?;
            println!("Authenticated");
            return Ok(());
        }
    };

    let body = client.request(request).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
