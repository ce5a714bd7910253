use anyhow::{Context, Result};
use std::time::Duration;
use wiremesh_api::{create_host_token, create_token};

use super::jwt_secret_or_default;
use crate::cli::{TokenArgs, TokenCommands};

pub(crate) fn handle_token(action: TokenCommands) -> Result<()> {
    match action {
        TokenCommands::Admin { subject, common } => {
            let secret = jwt_secret_or_default(common.secret.clone(), common.quiet);
            let token = create_token(
                &secret,
                subject.clone(),
                expiry(&common),
                vec!["admin".to_string()],
            )
            .context("Failed to create token")?;

            print_token(&common, &token, &format!("Operator '{}'", subject));
        }
        TokenCommands::Host { host_id, common } => {
            let secret = jwt_secret_or_default(common.secret.clone(), common.quiet);
            let token = create_host_token(&secret, host_id, expiry(&common))
                .context("Failed to create token")?;

            print_token(&common, &token, &format!("Host {}", host_id));
        }
    }
    Ok(())
}

fn expiry(args: &TokenArgs) -> Duration {
    Duration::from_secs(args.hours.saturating_mul(3600))
}

fn print_token(args: &TokenArgs, token: &str, subject: &str) {
    if args.quiet {
        println!("{}", token);
        return;
    }
    println!("Token created\n");
    println!("Subject: {}", subject);
    println!("Expires in: {} hours", args.hours);
    println!("\nToken:");
    println!("{}", token);
}
