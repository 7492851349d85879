use clap::{Parser, Subcommand};

mod commands;
mod output;
mod tty;

use commands::{build::BuildArgs, env::EnvArgs, status::StatusArgs, unbuild::UnbuildArgs};

#[derive(Parser)]
#[command(
    name = "stackhand",
    version,
    about = "Provision and tear down infrastructure components from task definitions"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a component by executing its task list
    Build(BuildArgs),
    /// Tear down a component's infrastructure resources
    Unbuild(UnbuildArgs),
    /// Report the most recent run recorded for a component
    Status(StatusArgs),
    /// Preview the merged configuration a build would resolve
    Env(EnvArgs),
}

fn exit_code_to_u8(code: i32) -> u8 {
    if (0..=255).contains(&code) {
        code as u8
    } else {
        1
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = commands::GlobalArgs {};

    let (result, exit_code) = commands::run_json(cli.command, &global);
    output::print_json_result(result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}
