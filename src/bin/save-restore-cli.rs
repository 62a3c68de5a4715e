use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use save_restore_client::{BlockingSaveRestoreClient, ClientError, Payload, ROOT_NODE_UID};

const EXIT_CODE_SUCCESS: i32 = 0;
const EXIT_CODE_CLI_PARAMETER_ERROR: i32 = -1;
const EXIT_CODE_OPERATION_FAILED: i32 = -2;

#[derive(Debug, Parser)]
#[command(
    name = "save-restore-cli",
    version,
    about = "CLI tool for operations on Save-and-Restore nodes",
    after_help = "Environment variables:\n  \
        SAVE_RESTORE_BASE_URL       alternative way to specify the base URL\n  \
        SAVE_RESTORE_USER_NAME      alternative way to specify the user name\n  \
        SAVE_RESTORE_USER_PASSWORD  user password (use with caution)\n\
        Command-line parameters override the respective environment variables."
)]
struct Cli {
    /// Base URL for communication with the service, e.g.
    /// http://localhost:8080/save-restore.
    #[arg(long, env = "SAVE_RESTORE_BASE_URL")]
    base_url: Option<String>,

    /// User name for authentication with the service. If an operation
    /// requires authentication and no name is specified, the user is
    /// prompted for it. The user is always prompted for the password
    /// unless SAVE_RESTORE_USER_PASSWORD is set.
    #[arg(long, env = "SAVE_RESTORE_USER_NAME")]
    user_name: Option<String>,

    /// Create missing folders if required to complete the operation. The
    /// operation fails if the value is OFF and the folders are missing.
    #[arg(long, value_enum, default_value_t = Switch::Off)]
    create_folders: Switch,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 5.0)]
    timeout: f64,

    /// Enable debug output, including error chains.
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check user login credentials.
    #[command(name = "LOGIN")]
    Login,

    /// Operations on configuration nodes.
    #[command(name = "CONFIG")]
    Config {
        #[command(subcommand)]
        operation: ConfigOperation,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigOperation {
    /// Read a configuration node. May be used to check that a config node
    /// exists.
    #[command(name = "GET")]
    Get(ConfigTarget),

    /// Add (create) a new configuration node from a file with PV names.
    #[command(name = "ADD")]
    Add(ConfigSource),

    /// Update an existing configuration node from a file with PV names.
    #[command(name = "UPDATE")]
    Update(ConfigSource),
}

impl ConfigOperation {
    fn target(&self) -> &ConfigTarget {
        match self {
            Self::Get(target) => target,
            Self::Add(source) | Self::Update(source) => &source.target,
        }
    }

    fn source(&self) -> Option<&ConfigSource> {
        match self {
            Self::Get(_) => None,
            Self::Add(source) | Self::Update(source) => Some(source),
        }
    }
}

#[derive(Debug, Args)]
struct ConfigTarget {
    /// Configuration name including folders, e.g.
    /// /detectors/imaging/eiger_config.
    #[arg(long, short = 'c')]
    config_name: String,

    /// Print the loaded config data. The config node information is always
    /// printed.
    #[arg(long, value_enum, default_value_t = Switch::Off)]
    show_data: Switch,
}

#[derive(Debug, Args)]
struct ConfigSource {
    #[command(flatten)]
    target: ConfigTarget,

    /// Name of the file used as a source of PV names.
    #[arg(long, short = 'f')]
    file_name: PathBuf,

    /// Format of the file specified by '--file-name'.
    #[arg(long, value_enum, default_value_t = FileFormat::Autosave)]
    file_format: FileFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Switch {
    #[value(name = "ON")]
    On,
    #[value(name = "OFF")]
    Off,
}

impl Switch {
    fn is_on(self) -> bool {
        self == Self::On
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FileFormat {
    /// EPICS autosave `.sav` file: one PV name per line, `#` and `<` lines
    /// ignored.
    Autosave,
}

/// Runtime settings resolved from CLI arguments and environment variables.
#[derive(Debug)]
struct Settings {
    base_url: String,
    user_name: Option<String>,
    user_password: Option<String>,
    create_folders: bool,
    timeout: Duration,
    verbose: bool,
    command: Command,
}

impl Settings {
    fn from_cli(cli: Cli) -> Result<Self> {
        let Some(base_url) = cli.base_url else {
            bail!("required '--base-url' parameter is not specified");
        };
        if !cli.timeout.is_finite() || cli.timeout <= 0.0 {
            bail!("'--timeout' must be a positive number of seconds");
        }
        Ok(Self {
            base_url,
            user_name: cli.user_name,
            user_password: std::env::var("SAVE_RESTORE_USER_PASSWORD").ok(),
            create_folders: cli.create_folders.is_on(),
            timeout: Duration::from_secs_f64(cli.timeout),
            verbose: cli.verbose,
            command: cli.command,
        })
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap renders its own message and help text
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_CODE_SUCCESS,
                _ => EXIT_CODE_CLI_PARAMETER_ERROR,
            };
            let _ = err.print();
            process::exit(code);
        }
    };

    init_tracing(cli.verbose);

    let settings = match Settings::from_cli(cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(EXIT_CODE_CLI_PARAMETER_ERROR);
        }
    };

    print_settings(&settings);

    if let Err(err) = run(&settings) {
        if settings.verbose {
            eprintln!("Error: {err:?}");
        } else {
            eprintln!("Error: {err:#}");
        }
        process::exit(EXIT_CODE_OPERATION_FAILED);
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();
}

/// Prints the resolved settings for user convenience.
fn print_settings(settings: &Settings) {
    let operation = match &settings.command {
        Command::Login => "LOGIN".to_owned(),
        Command::Config { operation } => {
            let name = match operation {
                ConfigOperation::Get(_) => "GET",
                ConfigOperation::Add(_) => "ADD",
                ConfigOperation::Update(_) => "UPDATE",
            };
            format!("CONFIG {name}")
        }
    };
    println!("\nOperation: {operation}");
    println!("Base URL: {}", settings.base_url);
    println!("User name: {}", settings.user_name.as_deref().unwrap_or("(not set)"));
    println!(
        "User password: {}",
        if settings.user_password.is_some() { "*********" } else { "(not set)" }
    );
    println!("Verbose output: {}", settings.verbose);
    if let Command::Config { operation } = &settings.command {
        let target = operation.target();
        println!("Config name: {}", target.config_name);
        println!("Show data: {}", target.show_data.is_on());
        if let Some(source) = operation.source() {
            println!("Create folders: {}", settings.create_folders);
            println!("File name: {}", source.file_name.display());
            println!("File format: {:?}", source.file_format);
        }
    }
    println!();
}

fn run(settings: &Settings) -> Result<()> {
    match &settings.command {
        Command::Login => process_login(settings),
        Command::Config { operation } => process_config(settings, operation),
    }
}

fn open_client(settings: &Settings) -> Result<BlockingSaveRestoreClient> {
    let client = BlockingSaveRestoreClient::new(&settings.base_url).with_context(|| {
        format!("failed to create client with base URL '{}'", settings.base_url)
    })?;
    Ok(client.with_timeout(settings.timeout))
}

/// Resolves the user name and password, prompting for whatever is missing.
fn resolve_credentials(settings: &Settings) -> Result<(String, String)> {
    let mut prompted_name = false;
    let user_name = match settings.user_name.as_deref() {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => {
            prompted_name = true;
            print!("Username: ");
            io::stdout().flush().context("failed to flush stdout")?;
            let mut line = String::new();
            io::stdin()
                .lock()
                .read_line(&mut line)
                .context("failed to read user name")?;
            line.trim().to_owned()
        }
    };
    let password = match &settings.user_password {
        Some(password) => password.clone(),
        None => {
            if !prompted_name {
                // echo the preset name so the password prompt has context
                println!("Username: {user_name}");
            }
            rpassword::prompt_password("Password: ").context("failed to read password")?
        }
    };
    Ok((user_name, password))
}

fn process_login(settings: &Settings) -> Result<()> {
    let (user_name, password) = resolve_credentials(settings)?;
    let client = open_client(settings)?;
    debug!("sending login request");
    let response = client.login(&user_name, &password).context("login failed")?;
    println!("Login successful. Response:\n{}", render(&response)?);
    Ok(())
}

fn process_config(settings: &Settings, operation: &ConfigOperation) -> Result<()> {
    if let Some(source) = operation.source() {
        if !source.file_name.is_file() {
            bail!("input file '{}' does not exist", source.file_name.display());
        }
    }

    let mut client = open_client(settings)?;
    if operation.source().is_some() {
        let (user_name, password) = resolve_credentials(settings)?;
        client.auth_set(&user_name, &password);
    }

    match operation {
        ConfigOperation::Get(target) => config_get_command(&client, target),
        ConfigOperation::Add(source) => config_add_command(&client, settings, source),
        ConfigOperation::Update(source) => config_update_command(&client, source),
    }
}

fn config_get_command(client: &BlockingSaveRestoreClient, target: &ConfigTarget) -> Result<()> {
    let node_uid = find_node(client, &target.config_name, "CONFIGURATION")?
        .with_context(|| format!("config node '{}' does not exist", target.config_name))?;
    let config_node = client.node_get(&node_uid)?;
    println!("Config node:\n{}", render(&config_node)?);
    if target.show_data.is_on() {
        let config_data = client.config_get(&node_uid)?;
        println!("Config data:\n{}", render(&config_data)?);
    }
    Ok(())
}

fn config_add_command(
    client: &BlockingSaveRestoreClient,
    settings: &Settings,
    source: &ConfigSource,
) -> Result<()> {
    let config_name = &source.target.config_name;
    if find_node(client, config_name, "CONFIGURATION")?.is_some() {
        bail!("config node '{config_name}' already exists");
    }

    let pv_list = load_pvs_from_file(&source.file_name, source.file_format)?;
    let parent_uid = ensure_parent_folder(client, config_name, settings.create_folders)?
        .with_context(|| {
            format!("the folder for '{config_name}' does not exist (use '--create-folders ON')")
        })?;

    let (_, name) = split_node_path(config_name);
    let response = client.config_create(
        &parent_uid,
        &json!({"name": name}),
        &json!({"pvList": pv_list}),
        None,
    )?;
    println!("Config node created:\n{}", render_field(&response, "configurationNode")?);
    if source.target.show_data.is_on() {
        println!("Config data:\n{}", render_field(&response, "configurationData")?);
    }
    Ok(())
}

fn config_update_command(client: &BlockingSaveRestoreClient, source: &ConfigSource) -> Result<()> {
    let config_name = &source.target.config_name;
    let node_uid = find_node(client, config_name, "CONFIGURATION")?
        .with_context(|| format!("config node '{config_name}' does not exist"))?;

    let config_node = client
        .node_get(&node_uid)?
        .into_json()
        .context("node request returned no content")?;
    let mut config_data = client
        .config_get(&node_uid)?
        .into_json()
        .context("config request returned no content")?;
    if !config_data.is_object() {
        bail!("unexpected config data shape: expected a JSON object");
    }

    let pv_list = load_pvs_from_file(&source.file_name, source.file_format)?;
    config_data["pvList"] = pv_list;

    let response = client.config_update(&config_node, &config_data, None)?;
    println!("Config node modified:\n{}", render_field(&response, "configurationNode")?);
    if source.target.show_data.is_on() {
        println!("Config data:\n{}", render_field(&response, "configurationData")?);
    }
    Ok(())
}

/// Returns the uniqueId of the node when `node_path` points to an existing
/// node of the requested type, `None` otherwise.
fn find_node(
    client: &BlockingSaveRestoreClient,
    node_path: &str,
    node_type: &str,
) -> Result<Option<String>> {
    let payload = match client.structure_path_nodes(node_path) {
        Ok(payload) => payload,
        // unknown paths come back as 404
        Err(ClientError::Client { .. }) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let Some(nodes) = payload.into_json() else {
        return Ok(None);
    };
    let uid = nodes
        .as_array()
        .into_iter()
        .flatten()
        .find(|node| node["nodeType"] == node_type)
        .and_then(|node| node["uniqueId"].as_str().map(str::to_owned));
    Ok(uid)
}

/// Walks the folder components of `config_name` starting at the root,
/// creating missing folders when enabled. Returns the uniqueId of the
/// folder that is to hold the config node, or `None` when a folder is
/// missing and must not be created.
fn ensure_parent_folder(
    client: &BlockingSaveRestoreClient,
    config_name: &str,
    create_folders: bool,
) -> Result<Option<String>> {
    let (folders, _) = split_node_path(config_name);
    let mut path = String::new();
    let mut parent_uid = ROOT_NODE_UID.to_owned();
    for folder in &folders {
        path.push('/');
        path.push_str(folder);
        let uid = match find_node(client, &path, "FOLDER")? {
            Some(uid) => uid,
            None if create_folders => {
                debug!(%path, "creating missing folder");
                let response = client
                    .node_add(&parent_uid, folder, "FOLDER", None, None)
                    .with_context(|| format!("failed to create folder '{path}'"))?;
                response
                    .json()
                    .and_then(|node| node["uniqueId"].as_str())
                    .map(str::to_owned)
                    .context("folder creation response is missing 'uniqueId'")?
            }
            None => return Ok(None),
        };
        parent_uid = uid;
    }
    Ok(Some(parent_uid))
}

/// Splits a node path such as `/a/b/name` into folder components and the
/// final node name.
fn split_node_path(node_path: &str) -> (Vec<String>, String) {
    let normalized = if node_path.starts_with('/') {
        node_path.to_owned()
    } else {
        format!("/{node_path}")
    };
    let mut parts: Vec<String> = normalized.split('/').skip(1).map(str::to_owned).collect();
    let name = parts.pop().unwrap_or_default();
    (parts, name)
}

/// Loads PV names from a file and converts them to the `pvList` format
/// accepted by the service.
fn load_pvs_from_file(file_name: &Path, file_format: FileFormat) -> Result<Value> {
    let pv_names = match file_format {
        FileFormat::Autosave => {
            let content = std::fs::read_to_string(file_name)
                .with_context(|| format!("failed to read '{}'", file_name.display()))?;
            parse_autosave(&content)
        }
    };
    if pv_names.is_empty() {
        bail!("no PV names found in '{}'", file_name.display());
    }
    Ok(Value::Array(
        pv_names.iter().map(|name| json!({"pvName": name})).collect(),
    ))
}

/// Extracts PV names from autosave `.sav` content: first token of each
/// line, skipping comment (`#`) and XML-ish (`<`) lines.
fn parse_autosave(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && !line.starts_with('<'))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

/// Renders a payload for terminal output.
fn render(payload: &Payload) -> Result<String> {
    Ok(match payload {
        Payload::Json(value) => {
            serde_json::to_string_pretty(value).context("failed to render JSON output")?
        }
        Payload::Text(text) => text.clone(),
        Payload::Empty => "(no content)".to_owned(),
    })
}

/// Renders one field of a JSON payload for terminal output.
fn render_field(payload: &Payload, field: &str) -> Result<String> {
    let value = payload
        .json()
        .and_then(|value| value.get(field))
        .with_context(|| format!("response is missing the '{field}' field"))?;
    serde_json::to_string_pretty(value).context("failed to render JSON output")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_autosave_keeps_first_token_and_skips_markup() {
        let content = "\
# save/restore file\n\
<config>\n\
simulated:A 1.0\n\
simulated:B\n\
\n\
  simulated:C 2.5 extra\n";
        let pv_names = parse_autosave(content);
        assert_eq!(pv_names, vec!["simulated:A", "simulated:B", "simulated:C"]);
    }

    #[test]
    fn split_node_path_separates_folders_from_name() {
        let (folders, name) = split_node_path("/detectors/imaging/eiger_config");
        assert_eq!(folders, vec!["detectors", "imaging"]);
        assert_eq!(name, "eiger_config");

        let (folders, name) = split_node_path("top_level");
        assert!(folders.is_empty());
        assert_eq!(name, "top_level");
    }

    #[test]
    fn uppercase_command_names_parse() {
        let cli = Cli::try_parse_from([
            "save-restore-cli",
            "--base-url",
            "http://localhost:8080/save-restore",
            "CONFIG",
            "GET",
            "--config-name",
            "/detectors/eiger_config",
            "--show-data",
            "ON",
        ])
        .expect("arguments parse");
        match cli.command {
            Command::Config {
                operation: ConfigOperation::Get(target),
            } => {
                assert_eq!(target.config_name, "/detectors/eiger_config");
                assert!(target.show_data.is_on());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn lowercase_command_names_are_rejected() {
        let outcome = Cli::try_parse_from([
            "save-restore-cli",
            "--base-url",
            "http://localhost:8080/save-restore",
            "login",
        ]);
        assert!(outcome.is_err());
    }

    #[test]
    fn missing_config_name_is_a_parse_error() {
        let outcome = Cli::try_parse_from([
            "save-restore-cli",
            "--base-url",
            "http://localhost:8080/save-restore",
            "CONFIG",
            "GET",
        ]);
        assert!(outcome.is_err());
    }
}
