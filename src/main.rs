use anyhow::{Context, Result};
use campus_mirror::{
    cli::{Cli, Commands},
    config::Settings,
    generate::{generate_dataset, GenerationReport},
    graph::GraphStore,
    mirror::{peer_mirrors, MirrorReport},
    schema::{relationship_types, DependencyResolver, EntityKind},
    store::FactStore,
    sync::{GraphSynchronizer, SyncMode, SyncReport},
    LogUi, Phase, RunContext, Ui, UiApp,
};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // The dashboard owns the terminal, so log lines only go out without it
    if !cli.tui {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }

    let settings = cli.settings().context("Failed to load settings")?;

    match &cli.command {
        Commands::ListEntities => list_entities(),
        Commands::Stats => stats(&settings),
        command if cli.tui => {
            let mut ui = UiApp::new()?;
            match execute(command, &settings, &mut ui) {
                Ok(summary) => ui.finish(&summary),
                Err(err) => {
                    ui.finish(&format!("Error: {:#}", err))?;
                    Err(err)
                }
            }
        }
        command => {
            let mut ui = LogUi::new();
            let summary = execute(command, &settings, &mut ui)?;
            println!("\n{}", summary);
            Ok(())
        }
    }
}

fn execute<U: Ui>(command: &Commands, settings: &Settings, ui: &mut U) -> Result<String> {
    let start = Instant::now();

    let summary = match command {
        Commands::Run { .. } => {
            let mut ctx = RunContext::from_settings(settings)?;
            let generated = generate_dataset(&ctx.facts, &settings.generation, ui)
                .context("Dataset generation failed")?;
            let synced = sync_graph(&mut ctx, ui, SyncMode::Full)?;
            let exported = export_mirrors(&ctx.facts, settings, ui)?;

            format!(
                "{}\n{}\n{}",
                describe_generation(&generated),
                describe_sync(&synced),
                describe_export(&exported)
            )
        }

        Commands::Generate { .. } => {
            let facts = FactStore::open(&settings.facts_path()?)?;
            let generated = generate_dataset(&facts, &settings.generation, ui)
                .context("Dataset generation failed")?;
            describe_generation(&generated)
        }

        Commands::Sync { resume } => {
            let mut ctx = RunContext::from_settings(settings)?;
            let mode = if *resume {
                SyncMode::Resume
            } else {
                SyncMode::Full
            };
            describe_sync(&sync_graph(&mut ctx, ui, mode)?)
        }

        Commands::ExportDocuments { .. } => {
            let facts = FactStore::open(&settings.facts_path()?)?;
            describe_export(&export_mirrors(&facts, settings, ui)?)
        }

        Commands::ListEntities | Commands::Stats => String::new(),
    };

    Ok(format!(
        "{}\nFinished in {:.1}s",
        summary,
        start.elapsed().as_secs_f64()
    ))
}

fn sync_graph<U: Ui>(ctx: &mut RunContext, ui: &mut U, mode: SyncMode) -> Result<SyncReport> {
    let mut sync = GraphSynchronizer::new(ctx, ui)?;
    let report = sync
        .run(mode)
        .with_context(|| format!("Graph sync stopped in state {:?}", sync.state()))?;
    Ok(report)
}

fn export_mirrors<U: Ui>(
    facts: &FactStore,
    settings: &Settings,
    ui: &mut U,
) -> Result<Vec<MirrorReport>> {
    ui.set_phase(Phase::Exporting);
    let dir = settings.documents_path()?;

    let mut reports = Vec::new();
    for mirror in peer_mirrors(&dir) {
        let report = mirror
            .rebuild(facts)
            .with_context(|| format!("Failed to rebuild {} mirror", mirror.name()))?;
        ui.log(format!(
            "{}: {} entries written to {}",
            report.mirror,
            report.documents,
            dir.display()
        ));
        if report.rejected > 0 {
            ui.warn(format!("{}: {} rows rejected", report.mirror, report.rejected));
        }
        reports.push(report);
    }
    Ok(reports)
}

fn describe_generation(report: &GenerationReport) -> String {
    format!(
        "Generated {} reference rows, {} schedules, {} students and {} attendance rows{}",
        report.catalog.total(),
        report.schedules,
        report.facts.students,
        report.facts.attendance,
        report
            .seed
            .map(|s| format!(" (seed {})", s))
            .unwrap_or_default()
    )
}

fn describe_sync(report: &SyncReport) -> String {
    let mut out = match report.resumed_after {
        Some(kind) => format!("Resumed graph sync after {}\n", kind),
        None => String::new(),
    };
    for t in &report.types {
        out.push_str(&format!(
            "  {:<12} {:>8} nodes {:>8} relationships {:>4} skipped\n",
            t.kind.label(),
            t.nodes,
            t.edges,
            t.skipped
        ));
    }
    out.push_str(&format!(
        "Mirrored {} nodes and {} relationships",
        report.nodes(),
        report.edges()
    ));
    out
}

fn describe_export(reports: &[MirrorReport]) -> String {
    reports
        .iter()
        .map(|r| {
            format!(
                "Rebuilt {} mirror: {} entries, {} rejected",
                r.mirror, r.documents, r.rejected
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn list_entities() -> Result<()> {
    let resolver = DependencyResolver::new();
    let ordered = resolver.all_entities_ordered().map_err(anyhow::Error::msg)?;

    println!("Entity types in sync order ({}):\n", ordered.len());
    for schema in ordered {
        let relationships: Vec<String> = schema
            .foreign_keys
            .iter()
            .map(|fk| format!("{} -> {}", fk.relationship, fk.references))
            .collect();

        println!(
            "  {:<12} {:<15} {}{}",
            schema.kind.label(),
            schema.table,
            relationships.join(", "),
            if schema.partitioned {
                "  [partitioned by semester]"
            } else {
                ""
            }
        );
    }

    Ok(())
}

fn stats(settings: &Settings) -> Result<()> {
    let facts = FactStore::open(&settings.facts_path()?)?;
    let graph = GraphStore::open(&settings.graph_path()?)?;

    println!("{:<12} {:>10} {:>10}", "Entity", "Rows", "Nodes");
    for kind in ordered_kinds()? {
        println!(
            "{:<12} {:>10} {:>10}",
            kind.label(),
            facts.count(kind)?,
            graph.node_count(Some(kind))?
        );
    }

    println!("\nRelationships:");
    for rel in relationship_types() {
        println!("  {:<16} {:>10}", rel, graph.edge_count(Some(rel))?);
    }

    let partitions = facts.partitions()?;
    println!(
        "\nAttendance partitions: {}",
        partitions
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join(", ")
    );

    match graph.checkpoint()? {
        Some(cp) => println!(
            "Last sync: {} at {}{}",
            if cp.completed { "completed" } else { "unfinished" },
            cp.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            cp.last_committed
                .map(|k| format!(" (last committed {})", k))
                .unwrap_or_default()
        ),
        None => println!("Last sync: never"),
    }

    Ok(())
}

fn ordered_kinds() -> Result<Vec<EntityKind>> {
    Ok(DependencyResolver::new()
        .all_entities_ordered()
        .map_err(anyhow::Error::msg)?
        .into_iter()
        .map(|s| s.kind)
        .collect())
}
