// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod check;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::auth::{RequestGuard, Session, SessionVerifier};
use crate::config::CheckerConfig;

/// Indexy command-line tools
#[derive(Parser, Debug)]
#[command(name = "indexy-cli")]
#[command(version)]
#[command(about = "Check whether URLs are indexed by search engines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check one or more URLs
    Check(check::CheckArgs),

    /// Print today's request token
    Token,

    /// Sign a session cookie value for a user
    Session(SessionArgs),
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    #[arg(long)]
    pub user_id: i64,

    #[arg(long)]
    pub email: String,

    #[arg(long, default_value = "")]
    pub name: String,

    #[arg(long, default_value = "user")]
    pub role: String,
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = CheckerConfig::from_env();
    config.validate()?;

    match cli.command {
        Commands::Check(args) => check::run_check(args, &config).await,
        Commands::Token => {
            let guard = RequestGuard::new(config.api_security_secret.clone(), None);
            println!("{}", guard.current_token());
            Ok(())
        }
        Commands::Session(args) => {
            let verifier = SessionVerifier::new(&config.jwt_secret);
            let token = verifier.sign(&Session {
                user_id: args.user_id,
                email: args.email,
                name: args.name,
                role: args.role,
            })?;
            println!("{}", token);
            Ok(())
        }
    }
}
