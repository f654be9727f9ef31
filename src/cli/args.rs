use super::CliError;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Profile {
        user_id: String,
        email: Option<String>,
        completed: bool,
    },
    Unit {
        franchisee_id: String,
        name: Option<String>,
    },
    Help,
    Version,
}

pub const USAGE: &str = "\
Usage:
  onboarding_core_cli profile --user <id> [--email <address>] [--completed]
  onboarding_core_cli unit --franchisee <id> [--name <unit name>]
  onboarding_core_cli --help | --version

Environment:
  ONBOARDING_TOKEN        bearer token sent to the backend
  ONBOARDING_CORE_HOME    directory holding config.json
  ONBOARDING_CORE_CLI_SCRIPT  read answers line by line from stdin";

fn value_for(flag: &str, args: &mut impl Iterator<Item = String>) -> Result<String, CliError> {
    args.next()
        .filter(|value| !value.starts_with("--"))
        .ok_or_else(|| CliError::Usage(format!("Missing value for {flag}")))
}

pub fn parse_args<I>(args: I) -> Result<Command, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(command) = args.next() else {
        return Err(CliError::Usage("Missing command".into()));
    };

    match command.as_str() {
        "--help" | "-h" | "help" => Ok(Command::Help),
        "--version" | "-V" | "version" => Ok(Command::Version),
        "profile" => {
            let mut user_id = None;
            let mut email = None;
            let mut completed = false;
            while let Some(flag) = args.next() {
                match flag.as_str() {
                    "--user" => user_id = Some(value_for(&flag, &mut args)?),
                    "--email" => email = Some(value_for(&flag, &mut args)?),
                    "--completed" => completed = true,
                    other => return Err(CliError::Usage(format!("Unknown option: {other}"))),
                }
            }
            let user_id = user_id.ok_or_else(|| CliError::Usage("profile requires --user".into()))?;
            Ok(Command::Profile {
                user_id,
                email,
                completed,
            })
        }
        "unit" => {
            let mut franchisee_id = None;
            let mut name = None;
            while let Some(flag) = args.next() {
                match flag.as_str() {
                    "--franchisee" => franchisee_id = Some(value_for(&flag, &mut args)?),
                    "--name" => name = Some(value_for(&flag, &mut args)?),
                    other => return Err(CliError::Usage(format!("Unknown option: {other}"))),
                }
            }
            let franchisee_id = franchisee_id
                .ok_or_else(|| CliError::Usage("unit requires --franchisee".into()))?;
            Ok(Command::Unit {
                franchisee_id,
                name,
            })
        }
        other => Err(CliError::Usage(format!("Unknown command: {other}"))),
    }
}
