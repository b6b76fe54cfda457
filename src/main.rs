mod cli;

use ach_relay::{
    builder::FileBuilder,
    config::{Config, TransportConfig},
    depository::{self, ReturnEffect},
    directory::{AccountDirectory, InMemoryDirectory, PartyRef},
    error::{self, AchError},
    events::{ChannelPublisher, OutboundEvent},
    fundflow::{self, Originator},
    inbound::{
        CorrectionProcessor, InboundPipeline, InboundScheduler, PrenoteProcessor, ProcessorChain,
        ReturnProcessor,
    },
    metrics::{MetricsSink, TracingMetrics},
    microdeposit::{MicroDeposits, SqliteAttemptLimiter},
    money::Amount,
    nacha::{self, NachaError},
    outbound::{Aggregator, CutoffSchedule, CutoffTrigger, Staging},
    storage::{
        self, Database, MicroDepositRepository, Transfer, TransferRepository, TransferStatus,
    },
    transport::{AgentTransport, DirectoryConnector, IpAllowlist, Transport, TransportPaths},
    utils,
};
use clap::Parser;
use cli::{Cli, Commands, MicroDepositCommand};
use colored::*;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("ach_relay=debug,info")
        .init();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve(config).await,

        Commands::Init => {
            info!("Initializing...");
            initialize(&config).await
        }

        Commands::Cutoff => {
            info!("Running manual cutoff...");
            run_cutoff(&config).await
        }

        Commands::Transfer {
            from,
            to,
            amount,
            description,
            same_day,
        } => submit_transfer(&config, &from, &to, &amount, &description, same_day).await,

        Commands::MicroDeposit(command) => micro_deposit(&config, command).await,

        Commands::Inspect { file, unmasked } => inspect(&file, unmasked),

        Commands::ReturnCodes => {
            show_return_codes();
            Ok(())
        }

        Commands::Stats { format } => {
            info!("Generating statistics...");
            show_stats(&config, &format)
        }
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

/// Collaborators shared by every command that touches transfers.
struct Services {
    db: Arc<Database>,
    directory: Arc<dyn AccountDirectory>,
    builder: Arc<FileBuilder>,
    metrics: Arc<dyn MetricsSink>,
}

fn services(config: &Config) -> error::Result<Services> {
    config.validate()?;
    let directory = match &config.directory.seed_file {
        Some(path) if Path::new(path).exists() => InMemoryDirectory::from_json_file(path)?,
        Some(path) => {
            warn!("Directory seed file {} not found, starting empty", path);
            InMemoryDirectory::new()
        }
        None => InMemoryDirectory::new(),
    };

    Ok(Services {
        db: Arc::new(Database::new(&config.database.path)?),
        directory: Arc::new(directory),
        builder: Arc::new(FileBuilder::new(config.odfi.clone())?),
        metrics: Arc::new(TracingMetrics),
    })
}

fn transport(config: &TransportConfig) -> error::Result<Arc<dyn Transport>> {
    let address: IpAddr = config.address.parse().map_err(|_| {
        AchError::Config(format!("transport.address {:?} is not an IP address", config.address))
    })?;
    Ok(Arc::new(AgentTransport::new(
        DirectoryConnector::new(&config.root, address),
        IpAllowlist::parse(&config.allowed_ips)?,
        TransportPaths::new(&config.inbound_path, &config.outbound_path, &config.return_path)?,
    )))
}

fn aggregator(
    config: &Config,
    transport: Arc<dyn Transport>,
    metrics: Arc<dyn MetricsSink>,
) -> error::Result<Aggregator> {
    Ok(Aggregator::new(
        Staging::new(&config.staging.dir),
        transport,
        CutoffSchedule::from_config(&config.cutoffs)?,
        metrics,
    ))
}

async fn serve(config: Config) -> error::Result<()> {
    println!("{}", "Starting ACH service...".green());
    let svc = services(&config)?;
    let transport = transport(&config.transport)?;

    let (publisher, events) = ChannelPublisher::new(1024);
    let publisher = Arc::new(publisher);
    let aggregator = aggregator(&config, transport.clone(), svc.metrics.clone())?;
    let (_trigger, requests) = CutoffTrigger::channel(8);

    let strategy =
        fundflow::strategy_from_config(&config.fund_flow, svc.builder.clone(), svc.directory.clone());
    let chain = ProcessorChain::new(vec![
        Box::new(CorrectionProcessor::new(svc.metrics.clone())),
        Box::new(PrenoteProcessor),
        Box::new(ReturnProcessor::new(
            svc.db.clone(),
            svc.db.clone(),
            svc.db.clone(),
            strategy,
            publisher.clone(),
            svc.metrics.clone(),
        )),
    ]);
    let pipeline = Arc::new(InboundPipeline::new(
        transport,
        chain,
        publisher.clone(),
        svc.metrics.clone(),
        config.inbound.clone(),
    ));

    let shutdown = CancellationToken::new();
    let mut notices = publisher.subscribe_inbound();
    let notice_shutdown = shutdown.clone();
    let notice_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = notice_shutdown.cancelled() => break,
                notice = notices.recv() => match notice {
                    Ok(n) => info!(
                        "Processed {} file {}: {} entries, {} returns, {} corrections, {} prenotes",
                        format!("{:?}", n.kind).to_lowercase(),
                        n.filename,
                        n.entries,
                        n.returns,
                        n.corrections,
                        n.prenotes
                    ),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Notice log fell behind, skipped {}", skipped)
                    }
                    Err(_) => break,
                },
            }
        }
    });

    let aggregator_task = tokio::spawn(aggregator.run(events, requests, shutdown.clone()));
    let inbound_task = tokio::spawn(
        InboundScheduler::from_config(&config.inbound).run(pipeline, shutdown.clone()),
    );

    println!("{}", "✓ Service running, press Ctrl-C to stop".green());
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown.cancel();

    for (name, task) in [
        ("aggregator", aggregator_task),
        ("inbound", inbound_task),
        ("notices", notice_task),
    ] {
        if let Err(e) = task.await {
            error!("Task {} ended abnormally: {}", name, e);
        }
    }
    println!("{}", "Stopped".yellow());
    Ok(())
}

async fn run_cutoff(config: &Config) -> error::Result<()> {
    config.validate()?;
    let aggregator = aggregator(config, transport(&config.transport)?, Arc::new(TracingMetrics))?;
    let (trigger, requests) = CutoffTrigger::channel(1);
    // nothing publishes in a one-shot run; the sender only keeps the channel open
    let (_publisher, events) = ChannelPublisher::new(1);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(aggregator.run(events, requests, shutdown.clone()));

    let result = trigger
        .trigger(Duration::from_secs(config.staging.trigger_timeout_secs))
        .await;
    shutdown.cancel();
    if let Err(e) = task.await {
        error!("Aggregator task ended abnormally: {}", e);
    }

    let report = result?;
    if report.uploaded.is_empty() {
        println!("{}", "Nothing staged".yellow());
    }
    for name in &report.uploaded {
        println!("{} {}", "✓ Uploaded".green(), name);
    }
    Ok(())
}

async fn submit_transfer(
    config: &Config,
    from: &str,
    to: &str,
    amount: &str,
    description: &str,
    same_day: bool,
) -> error::Result<()> {
    let svc = services(config)?;
    let source: PartyRef = from.parse()?;
    let destination: PartyRef = to.parse()?;
    let amount: Amount = amount.parse()?;

    let (publisher, mut events) = ChannelPublisher::new(16);
    let strategy =
        fundflow::strategy_from_config(&config.fund_flow, svc.builder.clone(), svc.directory.clone());
    let originator = Originator::new(
        svc.directory.clone(),
        strategy,
        svc.db.clone(),
        Arc::new(publisher),
        &config.odfi.company_id,
    );

    let aggregator = aggregator(config, transport(&config.transport)?, svc.metrics.clone())?;
    let transfer = originator
        .submit(Transfer::new(amount, source, destination, description).same_day(same_day))
        .await?;
    stage_or_fail(&aggregator, &mut events, &svc.db, &[transfer.id.clone()]).await?;

    println!("{} {}", "✓ Transfer accepted:".green(), transfer.id);
    println!("  Amount:       {}", transfer.amount);
    println!("  From:         {}", transfer.source);
    println!("  To:           {}", transfer.destination);
    println!("  Same day:     {}", transfer.same_day);
    println!("  Created:      {}", utils::format_timestamp(&transfer.created));
    Ok(())
}

/// Stages the files a CLI submission produced. When staging fails the
/// transfers are marked failed and anything already staged is tombstoned.
async fn stage_or_fail(
    aggregator: &Aggregator,
    events: &mut mpsc::Receiver<OutboundEvent>,
    db: &Database,
    transfer_ids: &[String],
) -> error::Result<()> {
    let mut staged = Ok(());
    while let Ok(event) = events.try_recv() {
        if let Err(e) = aggregator.handle_event(event).await {
            staged = Err(e);
            break;
        }
    }
    let e = match staged {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    for id in transfer_ids {
        error!("Transfer {} could not be staged: {}", id, e);
        if let Err(update) = db.update_transfer_status(id, TransferStatus::Failed, None) {
            error!("Could not mark transfer {} failed: {}", id, update);
        }
        let cancel = OutboundEvent::TransferCanceled {
            transfer_id: id.clone(),
        };
        if let Err(cancel) = aggregator.handle_event(cancel).await {
            warn!("Could not cancel staged legs of {}: {}", id, cancel);
        }
    }
    Err(e)
}

async fn micro_deposit(config: &Config, command: MicroDepositCommand) -> error::Result<()> {
    let settings = config
        .micro_deposits
        .as_ref()
        .ok_or_else(|| AchError::Config("[micro_deposits] is not configured".to_string()))?;
    let svc = services(config)?;
    let (publisher, mut events) = ChannelPublisher::new(16);
    let service = MicroDeposits::new(
        svc.builder.clone(),
        svc.directory.clone(),
        svc.db.clone(),
        svc.db.clone(),
        Arc::new(SqliteAttemptLimiter::new(svc.db.clone(), settings.max_attempts)),
        Arc::new(publisher),
        settings.source(),
    );

    match command {
        MicroDepositCommand::Initiate { account } => {
            let destination: PartyRef = account.parse()?;
            let aggregator = aggregator(config, transport(&config.transport)?, svc.metrics.clone())?;
            let md = service.initiate(&destination).await?;
            if let Err(e) = stage_or_fail(&aggregator, &mut events, &svc.db, &md.transfer_ids).await {
                let failed = svc.db.update_micro_deposit(&md.id, TransferStatus::Failed, None);
                if let Err(update) = failed {
                    error!("Could not mark micro-deposit {} failed: {}", md.id, update);
                }
                return Err(e);
            }
            println!("{} {}", "✓ Micro-deposits sent:".green(), md.id);
            println!("  Account:      {}", md.destination);
            println!("  Transfers:    {}", md.transfer_ids.join(", "));
        }
        MicroDepositCommand::Confirm { account, amounts } => {
            let destination: PartyRef = account.parse()?;
            let guesses = amounts
                .iter()
                .map(|a| a.parse::<Amount>())
                .collect::<error::Result<Vec<_>>>()?;
            service.confirm(&destination, &guesses).await?;
            println!("{} {}", "✓ Account verified:".green(), destination);
        }
    }
    Ok(())
}

fn inspect(path: &str, unmasked: bool) -> error::Result<()> {
    let contents = std::fs::read_to_string(path)?;
    let file = match nacha::read_file(&contents) {
        Ok(file) => file,
        Err(NachaError::MissingFileHeader(partial)) => {
            println!("{}", "Warning: file header record is missing".yellow());
            *partial
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", format!("=== {} ===", path).cyan().bold());
    if let Some(h) = &file.header {
        println!("  Destination:  {} {}", h.immediate_destination, h.immediate_destination_name);
        println!("  Origin:       {} {}", h.immediate_origin, h.immediate_origin_name);
        println!(
            "  Created:      {} {}",
            h.file_creation_date,
            h.file_creation_time
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_default()
        );
        println!("  Modifier:     {}", h.file_id_modifier);
    }
    println!("  Records:      {}", file.record_count());
    println!("  Debits:       {}", utils::format_cents(file.total_debit()));
    println!("  Credits:      {}", utils::format_cents(file.total_credit()));

    let widths = [15, 6, 9, 17, 14, 22, 6];
    for batch in &file.batches {
        let h = &batch.header;
        println!(
            "\n{}",
            format!(
                "Batch {} ({}, {} {}, effective {})",
                h.batch_number,
                h.service_class.code(),
                h.standard_entry_class.as_str(),
                h.company_entry_description,
                h.effective_entry_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string())
            )
            .yellow()
        );
        utils::print_table_border(100);
        utils::print_table_row(
            &["Trace", "Code", "RDFI", "Account", "Amount", "Name", "Return"],
            &widths,
        );
        utils::print_table_border(100);
        for entry in &batch.entries {
            let account = if unmasked {
                entry.dfi_account_number.clone()
            } else {
                utils::mask_account_number(&entry.dfi_account_number)
            };
            let returned = entry
                .addenda99
                .as_ref()
                .map(|a| a.return_code.clone())
                .unwrap_or_default();
            utils::print_table_row(
                &[
                    &entry.trace_number,
                    &entry.transaction_code.to_string(),
                    &entry.rdfi_identification,
                    &account,
                    &utils::format_cents(entry.amount),
                    &entry.individual_name,
                    &returned,
                ],
                &widths,
            );
            if let Some(rc) = entry.addenda99.as_ref().and_then(|a| depository::lookup(&a.return_code)) {
                println!("    {} {}: {}", "↳".red(), rc.code, rc.reason);
            }
        }
        utils::print_table_border(100);
    }
    Ok(())
}

fn show_return_codes() {
    println!("{}", "=== Return Codes ===".cyan().bold());
    utils::print_table_border(100);
    utils::print_table_row(&["Code", "Effect", "Reason"], &[5, 18, 70]);
    utils::print_table_border(100);
    for rc in depository::RETURN_CODES {
        let effect = match rc.effect {
            ReturnEffect::RejectReceiver => "reject receiver".red(),
            ReturnEffect::RejectOriginator => "reject originator".red(),
            ReturnEffect::None => "none".normal(),
        };
        utils::print_table_row(&[rc.code, &effect.to_string(), rc.reason], &[5, 18, 70]);
    }
    utils::print_table_border(100);
}

fn show_stats(config: &Config, format: &str) -> error::Result<()> {
    let db = Database::new(&config.database.path)?;
    let stats = db.get_stats()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "=== ACH Statistics ===".cyan().bold());
    println!("\nTransfers:");
    println!("  Total:      {}", stats.total_transfers);
    println!("  Pending:    {}", stats.pending_transfers.to_string().yellow());
    println!("  Processed:  {}", stats.processed_transfers.to_string().green());
    println!("  Failed:     {}", stats.failed_transfers.to_string().red());

    println!("\nDepositories:");
    println!("  Total:      {}", stats.total_depositories);
    println!("  Verified:   {}", stats.verified_depositories.to_string().green());
    println!("  Rejected:   {}", stats.rejected_depositories.to_string().red());

    println!("\nMicro-deposits: {}", stats.micro_deposits);
    Ok(())
}

async fn initialize(config: &Config) -> error::Result<()> {
    println!("{}", "Initializing ACH service...".green());
    config.validate()?;
    let _db = storage::Database::new(&config.database.path)?;
    println!("{}", "✓ Database initialized".green());

    tokio::fs::create_dir_all(&config.staging.dir).await?;
    for dir in [
        &config.transport.inbound_path,
        &config.transport.outbound_path,
        &config.transport.return_path,
    ] {
        tokio::fs::create_dir_all(Path::new(&config.transport.root).join(dir)).await?;
    }
    println!("{}", "✓ Staging and mailbox directories created".green());
    println!("{}", "✓ Configuration loaded".green());

    println!("\n{}", "Configuration:".cyan());
    println!("  ODFI:           {}", config.odfi.routing_number);
    println!("  Company:        {} ({})", config.odfi.company_name, config.odfi.company_id);
    println!("  Fund flow:      {:?} / {:?}", config.fund_flow.kind, config.fund_flow.posture);
    for cutoff in &config.cutoffs {
        println!(
            "  Cutoffs:        {} at {} {}",
            cutoff.routing_number,
            cutoff.windows.join(", "),
            cutoff.timezone
        );
    }
    println!("  Inbound every:  {}s", config.inbound.interval_secs);

    println!("\n{}", "Ready to use! Try running:".cyan());
    println!("  {} to run the service", "ach-relay serve".yellow());
    println!("  {} to decode a file", "ach-relay inspect <file>".yellow());
    println!("  {} to view statistics", "ach-relay stats".yellow());
    Ok(())
}
