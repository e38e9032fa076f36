mod result;

use std::fs::File;
use std::io::stdout;
use std::io::BufWriter;
use std::io::Write;
use std::path::PathBuf;

use bracken::generation::GeneratorConfig;
use bracken::generation::JacobianChainGenerator;
use bracken::output::write_dot;
use bracken::output::write_graphml;
use bracken::output::CsvReport;
use bracken::output::ThreadReport;
use bracken::scheduling::BranchAndBoundScheduler;
use bracken::scheduling::PriorityListScheduler;
use bracken::scheduling::Scheduler;
use bracken::solvers::BranchAndBoundSolver;
use bracken::solvers::DynamicProgrammingSolver;
use bracken::solvers::SolverOptions;
use bracken::statistics::configure_statistic_logging;
use bracken::JacobianChain;
use bracken::Sequence;
use clap::Parser;
use log::debug;
use log::error;
use log::info;
use log::LevelFilter;
use result::BrackenError;
use result::BrackenResult;

#[derive(Debug, Parser)]
#[command(author, version, about, arg_required_else_help = true)]
struct Args {
    /// The configuration file with the generator and solver properties.
    config_path: Option<PathBuf>,

    /// Directory the GraphML files and the CSV report are written to.
    #[arg(default_value = ".")]
    output_path: PathBuf,

    /// Print debug logs.
    #[arg(short, long)]
    verbose: bool,

    /// Log solver statistics to stdout.
    #[arg(long)]
    log_statistics: bool,

    /// Additionally write the best operation DAG of every chain as a
    /// DOT file.
    #[arg(long)]
    write_dot: bool,

    /// Print the table of recognised configuration keys and exit.
    #[arg(long)]
    list_keys: bool,
}

fn main() {
    let args = Args::parse();
    configure_logging(args.verbose);

    match run(args) {
        Ok(()) => {}
        Err(e) => {
            error!("Execution failed, error: {e}");
            std::process::exit(-1);
        }
    }
}

fn configure_logging(verbose: bool) {
    let level_filter = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .format(move |buf, record| writeln!(buf, "{}", record.args()))
        .filter_level(level_filter)
        .target(env_logger::Target::Stdout)
        .init();
}

fn run(args: Args) -> BrackenResult<()> {
    if args.list_keys {
        let mut out = stdout().lock();
        GeneratorConfig::registry().print_help(&mut out)?;
        SolverOptions::registry().print_help(&mut out)?;
        return Ok(());
    }

    let config_path = args.config_path.ok_or(BrackenError::MissingConfig)?;

    if args.log_statistics {
        configure_statistic_logging("%%%bracken-stat:", Some("%%%bracken-stat-end"), None);
    }

    // Generator and solver read the same file; each skips the keys of
    // the other.
    let mut generator_config = GeneratorConfig::default();
    GeneratorConfig::registry().parse_config(&mut generator_config, &config_path, true)?;
    let mut solver_options = SolverOptions::default();
    SolverOptions::registry().parse_config(&mut solver_options, &config_path, true)?;

    std::fs::create_dir_all(&args.output_path)?;
    let max_length = generator_config
        .chain_lengths
        .iter()
        .copied()
        .max()
        .unwrap_or(1);
    let csv_file = File::create(args.output_path.join("results.csv"))?;
    let mut report = CsvReport::new(BufWriter::new(csv_file), max_length)?;

    for mut chain in JacobianChainGenerator::new(generator_config) {
        let (reports, best_sequence) = solve_chain(&mut chain, &solver_options);
        report.write_row(chain.length(), chain.id, &reports)?;
        let path = write_graphml(&args.output_path, &chain)?;
        info!("wrote {}", path.display());

        if args.write_dot {
            if let Some(sequence) = &best_sequence {
                let dot_path = args
                    .output_path
                    .join(format!("chain_{}_{}.dot", chain.length(), chain.id));
                write_dot(sequence, &dot_path)?;
            }
        }
    }

    report.flush()?;
    Ok(())
}

/// Runs the full solver matrix over one chain: for every thread count,
/// the DP optimum, its B&B rescheduling, and the B&B solver seeded with
/// that bound under both schedulers. Returns the per-thread-count
/// measurements and the best sequence found at the full allowance.
fn solve_chain(
    chain: &mut JacobianChain,
    options: &SolverOptions,
) -> (Vec<ThreadReport>, Option<Sequence>) {
    let length = chain.length();
    chain.init_subchains();
    info!("solving chain {} of length {}", chain.id, length);

    // One table fill at the full allowance provides optima and
    // sequences for every smaller thread count.
    let mut dp = DynamicProgrammingSolver::new(SolverOptions {
        available_threads: length,
        ..options.clone()
    });
    let _ = dp.solve(chain);

    chain.optimized_costs = vec![0; length + 1];
    let mut reports = Vec::with_capacity(length);
    let mut best_sequence = None;

    for threads in 1..=length {
        let thread_options = SolverOptions {
            available_threads: threads,
            ..options.clone()
        };

        let mut dp_sequence = dp.sequence(Some(threads));
        let dp_makespan = dp_sequence.makespan(None);

        // Rescheduling the DP sequence repairs the idle gaps its serial
        // sibling ordering leaves behind.
        let post_scheduler = Scheduler::BranchAndBound(bnb_scheduler(&thread_options));
        let dp_bnb_makespan = post_scheduler.schedule(&mut dp_sequence, threads, usize::MAX);

        let list_solver = BranchAndBoundSolver::new(thread_options.clone());
        list_solver.set_upper_bound(dp_bnb_makespan);
        let list_scheduler = Scheduler::PriorityList(PriorityListScheduler);
        let list_result = list_solver.solve(chain, &list_scheduler);
        // A deadline may leave the seeded bound unbeaten; the DP
        // rescheduling result then stands.
        let bnb_list_makespan = list_result.makespan.min(dp_bnb_makespan);

        let exact_solver = BranchAndBoundSolver::new(thread_options.clone());
        exact_solver.set_upper_bound(dp_bnb_makespan);
        let exact_scheduler = Scheduler::BranchAndBound(bnb_scheduler(&thread_options));
        let exact_result = exact_solver.solve(chain, &exact_scheduler);
        let bnb_bnb_makespan = exact_result.makespan.min(dp_bnb_makespan);

        chain.optimized_costs[threads] = bnb_bnb_makespan
            .min(bnb_list_makespan)
            .min(dp_bnb_makespan)
            .min(dp_makespan);
        info!(
            "  threads {}: dp {} / dp+bnb {} / bnb+list {} / bnb+bnb {}{}",
            threads,
            dp_makespan,
            dp_bnb_makespan,
            bnb_list_makespan,
            bnb_bnb_makespan,
            if exact_result.finished_in_time {
                ""
            } else {
                " (deadline)"
            }
        );

        reports.push(ThreadReport {
            bnb_bnb_finished: exact_result.finished_in_time,
            bnb_bnb_makespan,
            bnb_list_makespan,
            dp_makespan,
            dp_bnb_makespan,
        });

        if threads == length {
            let winner = match exact_result.sequence {
                Some(sequence) if exact_result.makespan <= dp_bnb_makespan => sequence,
                _ => dp_sequence,
            };
            debug!("best sequence for {threads} threads:\n{winner}");
            best_sequence = Some(winner);
        }
    }

    (reports, best_sequence)
}

fn bnb_scheduler(options: &SolverOptions) -> BranchAndBoundScheduler {
    match options.time_budget() {
        Some(budget) => BranchAndBoundScheduler::with_time_budget(budget),
        None => BranchAndBoundScheduler::new(),
    }
}
