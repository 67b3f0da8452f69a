use std::process;
use std::time::Instant;

use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use pairwalk::algorithms::balance::balance_ratio;
use pairwalk::config::SamplerConfig;
use pairwalk::corpus_io::CorpusStorage;
use pairwalk::dataset::PairDataset;
use pairwalk::errors::{SamplerError, SamplerResult};
use pairwalk::types::graph_query::GraphQuery;
use pairwalk::worker::seed::{EnvRank, RankSource};

#[derive(Parser, Debug, Serialize)]
#[command(author, version, about)]
struct Args {
    /// Corpus name, the prefix of the index and storage files.
    #[arg(short, long)]
    dataset: Option<String>,

    /// The task to be performed: build, plan or sample.
    #[arg(short, long, default_value_t = String::from("sample"))]
    task: String,

    /// YAML sampler configuration.
    #[arg(short, long)]
    config: Option<String>,

    /// Directory of the corpus files, overrides the configuration.
    #[arg(short, long)]
    workspace: Option<String>,

    /// `.graph` files to build the corpus from.
    #[arg(short, long, num_args = 1..)]
    input: Vec<String>,

    /// Graph-level labels of the input graphs, comma separated.
    #[arg(short, long, value_delimiter = ',')]
    labels: Vec<u32>,

    /// Number of workers, overrides the configuration.
    #[arg(short, long)]
    num_workers: Option<usize>,

    /// Distributed rank; read from the RANK environment variable when absent.
    #[arg(short, long)]
    rank: Option<u32>,

    /// Threads running the workers.
    #[arg(long, default_value_t = 4)]
    num_threads: usize,
}

#[derive(Debug, Default)]
struct WorkerReport {
    worker_id: usize,
    graphs: usize,
    nodes: u64,
    pairs: usize,
    failures: usize,
    mean_query_size: f64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn run(args: Args) -> SamplerResult<()> {
    // Step 1: Assemble the configuration, command line flags taking precedence.
    let mut config = match &args.config {
        Some(path) => SamplerConfig::from_yaml_file(path)?,
        None => SamplerConfig::default(),
    };
    if let Some(dataset) = &args.dataset {
        config.dataset = dataset.clone();
    }
    if let Some(workspace) = &args.workspace {
        config.workspace = workspace.clone();
    }
    if let Some(num_workers) = args.num_workers {
        config.num_workers = num_workers;
    }
    config.validate()?;

    // Step 2: Perform the task, and report the time.
    let start = Instant::now();
    if args.task == "build" {
        let labels = (!args.labels.is_empty()).then_some(args.labels.as_slice());
        let storage = CorpusStorage::build_from_graph_files(
            &config.workspace,
            &config.dataset,
            &args.input,
            labels,
            config.symmetrize,
        )?;
        println!(
            "Corpus {}: {} graphs, {} nodes, classes {:?}.",
            config.dataset,
            storage.corpus_index.graph_count(),
            storage.total_nodes(),
            storage.corpus_index.num_classes()
        );
        println!("Build Elapsed Time: {:?} us", start.elapsed().as_micros());
    } else if args.task == "plan" {
        let storage = CorpusStorage::open(&config.workspace, &config.dataset)?;
        let dataset = PairDataset::new(config, &storage)?;
        let params = dataset.sampler().params();
        println!(
            "Walks: up to {} hops, restart probability {}, {} nodes per seed.",
            params.step_policy().max_steps(),
            params.restart_prob(),
            params.max_nodes_per_seed()
        );
        for (worker_id, job) in dataset.jobs().iter().enumerate() {
            println!(
                "Worker {worker_id}: {} graphs, workload {}.",
                job.graph_ids.len(),
                job.workload
            );
        }
        println!(
            "Balance ratio: {:.4}, epoch length: {} samples.",
            balance_ratio(dataset.jobs()),
            dataset.len()
        );
    } else if args.task == "sample" {
        let storage = CorpusStorage::open(&config.workspace, &config.dataset)?;
        let dataset = PairDataset::new(config, &storage)?;
        let rank_source = args.rank.or_else(|| EnvRank.current_rank());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(args.num_threads)
            .build()
            .map_err(|e| SamplerError::Configuration(format!("cannot start worker pool: {e}")))?;

        // Each worker context is created, owned and dropped inside one task.
        let reports = pool.install(|| {
            (0..dataset.jobs().len())
                .into_par_iter()
                .map(|worker_id| {
                    let mut ctx = dataset.worker(worker_id, &rank_source)?;
                    ctx.initialize(&storage)?;
                    let mut report = WorkerReport {
                        worker_id,
                        graphs: ctx.job_list().graph_ids.len(),
                        nodes: ctx.total_nodes(),
                        ..WorkerReport::default()
                    };
                    let mut query_nodes = 0u64;
                    for item in dataset.stream(&mut ctx) {
                        match item {
                            Ok(pair) => {
                                report.pairs += 1;
                                query_nodes += pair.query.vertex_count();
                            }
                            Err(err) if err.is_fatal() => return Err(err),
                            Err(_) => report.failures += 1,
                        }
                    }
                    if report.pairs > 0 {
                        report.mean_query_size = query_nodes as f64 / report.pairs as f64;
                    }
                    Ok(report)
                })
                .collect::<SamplerResult<Vec<WorkerReport>>>()
        })?;

        for report in &reports {
            println!(
                "Worker {}: {} graphs, {} nodes, {} pairs, {} failures, mean query size {:.2}.",
                report.worker_id,
                report.graphs,
                report.nodes,
                report.pairs,
                report.failures,
                report.mean_query_size
            );
        }
        println!("Sample Elapsed Time: {:?} us", start.elapsed().as_micros());
    } else {
        println!("Task {} not supported in pairwalk.", args.task);
    }
    Ok(())
}
