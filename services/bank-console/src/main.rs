use anyhow::{Context, Result, anyhow, bail};
use rust_decimal::Decimal;
use std::io::BufRead;
use std::sync::Arc;
use tb_client::transfer::parse_amount;
use tb_client::{
    AppContext, BlockReason, CardQuery, ClientConfig, FlowState, ReqwestTransport, StatementQuery, TracingUi,
    TransactionQuery,
};
use tb_storage::FileStore;
use tracing::{info, warn};

const DEFAULT_STATE_FILE: &str = ".triobank/state.json";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Login { tc: String, password: String },
    WhoAmI,
    Accounts,
    Cards,
    BlockCard { card_id: String },
    Transactions { account_id: String },
    Statement { account_id: String },
    Transfer { from: String, to: String, amount: Decimal },
    Theme { toggle: bool },
    Logout,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = match words.as_slice() {
            ["login", tc, password] => Command::Login {
                tc: (*tc).to_owned(),
                password: (*password).to_owned(),
            },
            ["whoami"] => Command::WhoAmI,
            ["accounts"] => Command::Accounts,
            ["cards"] => Command::Cards,
            ["block-card", card_id] => Command::BlockCard {
                card_id: (*card_id).to_owned(),
            },
            ["transactions", account_id] => Command::Transactions {
                account_id: (*account_id).to_owned(),
            },
            ["statement", account_id] => Command::Statement {
                account_id: (*account_id).to_owned(),
            },
            ["transfer", from, to, amount] => Command::Transfer {
                from: (*from).to_owned(),
                to: (*to).to_owned(),
                amount: parse_amount(amount).ok_or_else(|| anyhow!("invalid amount: {amount}"))?,
            },
            ["theme"] => Command::Theme { toggle: false },
            ["theme", "toggle"] => Command::Theme { toggle: true },
            ["logout"] => Command::Logout,
            _ => bail!(
                "usage: bank-console <login TC PASSWORD | whoami | accounts | cards | block-card ID | \
                 transactions ACCOUNT | statement ACCOUNT | transfer FROM TO AMOUNT | theme [toggle] | logout>"
            ),
        };
        Ok(command)
    }

    fn needs_session(&self) -> bool {
        !matches!(self, Command::Login { .. } | Command::Theme { .. })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config = ClientConfig::from_env();
    let state_file = std::env::var("TRIOBANK_STATE_FILE").unwrap_or_else(|_| DEFAULT_STATE_FILE.to_owned());
    let store = Arc::new(FileStore::open(&state_file)?);
    let transport = Arc::new(ReqwestTransport::new().context("failed to build http client")?);
    info!(api = %config.api_base, state_file, "bank-console starting");

    let ctx = AppContext::new(config, transport, store, Arc::new(TracingUi));
    if command.needs_session() && !ctx.profile.restore_session().await {
        bail!("not signed in, run `bank-console login TC PASSWORD` first");
    }

    run(&ctx, command).await
}

async fn run(ctx: &AppContext, command: Command) -> Result<()> {
    match command {
        Command::Login { tc, password } => login(ctx, &tc, &password).await?,
        Command::WhoAmI => {
            let user = ctx.profile.load_user_profile().await?;
            println!("{} ({})", user.display_name(), user.user_id.unwrap_or_default());
            if let Some(client) = ctx.profile.load_client().await {
                println!("client {}", client.client_id.unwrap_or_default());
            }
        }
        Command::Accounts => {
            for account in ctx.accounts.load(false).await? {
                println!(
                    "{}\t{}\t{:.2} {}\tavailable {:.2}",
                    account.id,
                    account.account_number.unwrap_or_default(),
                    account.balance,
                    account.currency,
                    account.available_balance
                );
            }
        }
        Command::Cards => {
            let query = CardQuery {
                customer_id: Some(ctx.accounts.customer_id().await?),
                ..CardQuery::default()
            };
            for card in ctx.cards.list(query).await? {
                println!("{}\t{}\t{:?}", card.id, card.card_type.as_str(), card.status);
            }
        }
        Command::BlockCard { card_id } => ctx.cards.block(&card_id, BlockReason::UserRequest).await?,
        Command::Transactions { account_id } => {
            let query = TransactionQuery {
                size: Some(20),
                ..TransactionQuery::default()
            };
            for transaction in ctx.account_ops.list_transactions(&account_id, &query).await? {
                println!(
                    "{}\t{}\t{}",
                    transaction.id,
                    transaction.status_or_pending().as_str(),
                    transaction.total_amount.unwrap_or_default()
                );
            }
        }
        Command::Statement { account_id } => {
            let statement = ctx
                .account_ops
                .fetch_statement(&account_id, &StatementQuery::default())
                .await?;
            for entry in statement.entries {
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.date.unwrap_or_default(),
                    entry.entry_type.unwrap_or_default(),
                    entry.amount.unwrap_or_default(),
                    entry.description.unwrap_or_default()
                );
            }
        }
        Command::Transfer { from, to, amount } => {
            ctx.accounts.load(false).await?;
            let receipt = ctx.transfers.submit_between_accounts(&from, &to, amount, None).await?;
            println!(
                "{} {}",
                receipt.transaction_id.as_deref().unwrap_or(&receipt.idempotency_key),
                receipt.status.as_str()
            );
            if let Some(poll) = receipt.poll {
                tokio::select! {
                    status = poll => match status? {
                        Some(status) => println!("final status {}", status.as_str()),
                        None => println!("still processing"),
                    },
                    _ = tokio::signal::ctrl_c() => warn!("stopped waiting for transfer status"),
                }
            }
        }
        Command::Theme { toggle } => {
            let theme = if toggle { ctx.theme.toggle() } else { ctx.theme.load() };
            println!("{theme}");
        }
        Command::Logout => ctx.profile.logout().await,
    }
    Ok(())
}

async fn login(ctx: &AppContext, tc: &str, password: &str) -> Result<()> {
    ctx.verification.login(tc, password).await?;
    eprint!("verification code: ");
    let code = tokio::select! {
        line = tokio::task::spawn_blocking(read_line) => line??,
        _ = tokio::signal::ctrl_c() => {
            ctx.verification.cancel();
            bail!("login cancelled");
        }
    };
    ctx.verification.submit_code(&code).await?;
    if !matches!(ctx.verification.state(), FlowState::Verified(_)) {
        bail!("verification did not complete");
    }
    Ok(())
}

fn read_line() -> Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|word| (*word).to_owned()).collect()
    }

    #[test]
    fn parses_transfer_with_comma_decimal() -> Result<()> {
        let command = Command::parse(&args(&["transfer", "a-1", "a-2", "12,50"]))?;
        assert_eq!(
            command,
            Command::Transfer {
                from: "a-1".to_owned(),
                to: "a-2".to_owned(),
                amount: Decimal::new(1250, 2),
            }
        );
        assert!(command.needs_session());
        Ok(())
    }

    #[test]
    fn theme_and_login_skip_session_restore() -> Result<()> {
        assert!(!Command::parse(&args(&["theme", "toggle"]))?.needs_session());
        assert!(!Command::parse(&args(&["login", "12345678901", "secret"]))?.needs_session());
        assert!(Command::parse(&args(&["fly"])).is_err());
        Ok(())
    }
}
