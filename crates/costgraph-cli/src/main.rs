//! Costgraph CLI: the `costgraph` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let config = support::load_config_or_exit(&cli.global);
    support::init_tracing(&config);

    match cli.command {
        Commands::Init { write_config, json } => {
            commands::init::run(&cli.global, &config, write_config, json)
        }

        Commands::Add {
            id,
            name,
            unit,
            stock,
            cost,
            deps,
            manual_cost,
            json,
        } => commands::add::run(
            &config,
            commands::add::Args {
                id,
                name,
                unit,
                stock,
                cost,
                deps,
                manual_cost,
            },
            json,
        ),

        Commands::Show { id, json } => commands::show::run_show(&config, id, json),

        Commands::List { all, json } => commands::show::run_list(&config, all, json),

        Commands::Edit {
            id,
            name,
            unit,
            stock,
            json,
        } => commands::edit::run(&config, id, commands::edit::Fields { name, unit, stock }, json),

        Commands::Dep { command } => commands::dep::run(&config, command),

        Commands::SetCost { id, cost, json } => commands::cost::run_set(&config, id, cost, json),

        Commands::Autoupdate { id, mode, json } => {
            commands::cost::run_autoupdate(&config, id, mode.enabled(), json)
        }

        Commands::Delete { id, json } => commands::delete::run(&config, id, json),

        Commands::Units { dimension, json } => {
            commands::units::run(dimension.map(Into::into), json)
        }

        Commands::Diff { old, new, json } => commands::diff::run(old, new, json),
    }
}
