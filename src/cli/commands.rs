use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ach-relay")]
#[command(about = "ACH origination, return reconciliation and micro-deposit verification")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the aggregator and inbound pipeline until Ctrl-C
    Serve,

    /// Create the database and working directories
    Init,

    /// Cut off every routing number now and upload what is staged
    Cutoff,

    /// Originate a transfer and stage its files
    Transfer {
        /// Account debited, as customer/account
        #[arg(long)]
        from: String,

        /// Account credited, as customer/account
        #[arg(long)]
        to: String,

        /// Amount such as "USD 12.47"
        #[arg(long)]
        amount: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Settle today when a window is still open
        #[arg(long)]
        same_day: bool,
    },

    /// Verify account ownership with micro-deposits
    #[command(name = "micro-deposit", subcommand)]
    MicroDeposit(MicroDepositCommand),

    /// Decode a NACHA file and print its contents
    Inspect {
        /// Path to the file
        file: String,

        /// Show account numbers unmasked
        #[arg(long)]
        unmasked: bool,
    },

    /// List the return codes and how each affects account status
    ReturnCodes,

    /// Show database statistics
    Stats {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum MicroDepositCommand {
    /// Send two micro-deposits to an account
    Initiate {
        /// Account to verify, as customer/account
        account: String,
    },

    /// Check the amounts a customer read from their statement
    Confirm {
        /// Account to verify, as customer/account
        account: String,

        /// Amounts such as "USD 0.05"
        #[arg(required = true, num_args = 1..)]
        amounts: Vec<String>,
    },
}
