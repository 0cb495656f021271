mod trace_file;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::info;
use vm::metrics::Snapshot;
use vm::mmu::CallbackResult;
use vm::rng::Seed;
use vm::{parse_trace, DualMmu, MmuConfig, MmuSide, PolicyKind, WorkloadConfig};

fn main() -> Result<()> {
    let args = clap::command!()
        .about("Compare page replacement policies against the optimal policy")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Raise log verbosity (repeatable)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("generate")
                .about("Generate a synthetic operation trace")
                .arg(Arg::new("processes").short('p').long("processes").default_value("10").value_parser(value_parser!(usize)))
                .arg(Arg::new("operations").short('n').long("operations").default_value("500").value_parser(value_parser!(usize)))
                .arg(Arg::new("seed").short('s').long("seed").default_value("12345"))
                .arg(Arg::new("size-min").long("size-min").default_value("32").value_parser(value_parser!(u64)))
                .arg(Arg::new("size-max").long("size-max").default_value("16384").value_parser(value_parser!(u64)))
                .arg(Arg::new("tolerance").long("tolerance").default_value("0").value_parser(value_parser!(f64)))
                .arg(
                    Arg::new("no-overshoot")
                        .long("no-overshoot")
                        .help("Never emit more than the requested number of operations")
                        .action(ArgAction::SetTrue),
                )
                .arg(Arg::new("output").short('o').long("output").default_value("-")),
        )
        .subcommand(
            Command::new("run")
                .about("Replay a trace through the optimal policy and the selected one")
                .arg(Arg::new("trace").required(true).help("Trace file, or - for stdin"))
                .arg(Arg::new("config").short('c').long("config").help("Configuration file"))
                .arg(Arg::new("policy").long("policy").help("FIFO, MRU, SC or RND"))
                .arg(Arg::new("frames").long("frames").value_parser(value_parser!(usize)))
                .arg(Arg::new("page-size").long("page-size").help("Page size in KB").value_parser(value_parser!(u64)))
                .arg(Arg::new("seed").long("seed").help("Seed of the random policy"))
                .arg(Arg::new("disk-cost").long("disk-cost").help("Seconds per miss").value_parser(value_parser!(u64)))
                .arg(
                    Arg::new("steps")
                        .long("steps")
                        .help("Print every snapshot")
                        .action(ArgAction::SetTrue),
                ),
        )
        .get_matches();

    let level = match args.get_count("verbose") {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match args.subcommand() {
        Some(("generate", m)) => generate(m),
        Some(("run", m)) => run(m),
        _ => unreachable!("a subcommand is required"),
    }
}

fn generate(m: &ArgMatches) -> Result<()> {
    let cfg = WorkloadConfig {
        processes: *m.get_one::<usize>("processes").context("missing process count")?,
        operations: *m.get_one::<usize>("operations").context("missing operation count")?,
        seed: Seed::Text(m.get_one::<String>("seed").cloned().unwrap_or_default()),
        size_min: *m.get_one::<u64>("size-min").context("missing minimum size")?,
        size_max: *m.get_one::<u64>("size-max").context("missing maximum size")?,
        tolerance: *m.get_one::<f64>("tolerance").context("missing tolerance")?,
        allow_overshoot: !m.get_flag("no-overshoot"),
    };

    let text = vm::generate(&cfg)?;
    info!("generated {} operations for {} processes", text.lines().count(), cfg.processes);

    let output = m.get_one::<String>("output").map(String::as_str).unwrap_or("-");
    trace_file::write_trace(output, &text)
}

fn load_config(m: &ArgMatches) -> Result<MmuConfig> {
    let file = m.get_one::<String>("config").map(String::as_str).unwrap_or("");
    let mut cfg = MmuConfig::load(file).with_context(|| format!("unable to load configuration {:?}", file))?;

    if let Some(policy) = m.get_one::<String>("policy") {
        cfg.policy = policy.parse::<PolicyKind>()?;
    }
    if let Some(&frames) = m.get_one::<usize>("frames") {
        cfg.total_frames = frames;
    }
    if let Some(&page_size) = m.get_one::<u64>("page-size") {
        cfg.page_size_kb = page_size;
    }
    if let Some(seed) = m.get_one::<String>("seed") {
        cfg.random_seed = Some(Seed::Text(seed.clone()));
    }
    if let Some(&disk_cost) = m.get_one::<u64>("disk-cost") {
        cfg.disk_cost_secs = disk_cost;
    }

    cfg.validate()?;
    Ok(cfg)
}

fn run(m: &ArgMatches) -> Result<()> {
    let cfg = load_config(m)?;
    let path = m.get_one::<String>("trace").context("missing trace path")?;
    let ops = parse_trace(&trace_file::read_trace(path)?);

    let mut mmu = DualMmu::new(cfg)?;
    let cfg = mmu.config();
    info!(
        "replaying {} operations: OPT vs {}, {} frames of {}KB",
        ops.len(),
        cfg.policy,
        cfg.total_frames,
        cfg.page_size_kb
    );
    if m.get_flag("steps") {
        mmu = mmu.with_snapshot_callback(Box::new(|snapshot: &Snapshot, _: &MmuSide| -> CallbackResult {
            println!("{}", snapshot);
            Ok(())
        }));
    }
    mmu.run(&ops)?;

    print_summary(mmu.optimal(), mmu.other());
    Ok(())
}

fn print_summary(opt: &MmuSide, other: &MmuSide) {
    let empty = Snapshot::capture(opt.tag(), String::new(), opt.table(), opt.metrics(), 0);
    let a = opt.last_snapshot().unwrap_or(&empty);
    let b = other.last_snapshot().unwrap_or(&empty);

    let rows: [(&str, String, String); 9] = [
        ("hits", a.hits.to_string(), b.hits.to_string()),
        ("misses", a.misses.to_string(), b.misses.to_string()),
        ("simulated time", format!("{}s", a.time), format!("{}s", b.time)),
        ("thrashing", format!("{}s ({}%)", a.thrash_secs, a.thrash_pct), format!("{}s ({}%)", b.thrash_secs, b.thrash_pct)),
        ("ram", format!("{}KB ({}%)", a.ram_kb, a.ram_pct), format!("{}KB ({}%)", b.ram_kb, b.ram_pct)),
        ("virtual", format!("{}KB ({}%)", a.vram_kb, a.vram_pct), format!("{}KB ({}%)", b.vram_kb, b.vram_pct)),
        ("fragmentation", format!("{}KB", a.fragmentation_kb), format!("{}KB", b.fragmentation_kb)),
        ("running", a.procs_running.to_string(), b.procs_running.to_string()),
        ("done", a.procs_done.to_string(), b.procs_done.to_string()),
    ];

    println!("{:<16} {:>18} {:>18}", "", opt.tag(), other.tag());
    for (name, left, right) in rows {
        println!("{:<16} {:>18} {:>18}", name, left, right);
    }
}
