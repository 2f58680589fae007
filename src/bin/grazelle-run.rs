// src/bin/grazelle-run.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process entry point: parses arguments, detects topology, loads the
//! graph, dispatches to the requested algorithm, and reports statistics.
//!
//! Grounded on `main.c`'s top-level flow (load graph, run, print execution
//! statistics, optionally write a ranks file) with every `exit()` call
//! replaced by propagating a [`grazelle::GrazelleError`] up to one
//! `process::exit` at the bottom of `main`.

use clap::Parser;
use grazelle::algorithms::{self, RunStats};
use grazelle::cli::{Algorithm, Args};
use grazelle::ingress;
use grazelle::numa::NumaTopology;
use grazelle::pool::Binding;
use grazelle::GrazelleError;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "grazelle-run failed");
            eprintln!("grazelle-run: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run() -> Result<(), GrazelleError> {
    let args = Args::parse();

    let topology = NumaTopology::detect().map_err(|_| GrazelleError::AllocationFailed {
        context: "NUMA topology detection".to_string(),
    })?;
    args.validate(&topology)?;

    let numa_nodes = args.resolved_numa_nodes();
    let thread_count = args.resolved_thread_count(&topology);

    tracing::info!(
        ?numa_nodes,
        thread_count,
        deployment = topology.deployment_type(),
        "starting grazelle-run"
    );

    let load_start = Instant::now();
    let mut ctx = ingress::build_graph_context(&args.graph_input_base, &numa_nodes, args.sched_granularity)?;
    let threads_per_node = (thread_count as usize / numa_nodes.len().max(1)).max(1) as u64;
    ctx.recompute_scheduling(threads_per_node, args.sched_granularity)?;
    tracing::info!(elapsed_ms = load_start.elapsed().as_millis() as u64, "graph loaded");

    let ctx = Arc::new(ctx);
    let binding = Binding::Default;

    let exec_start = Instant::now();
    let stats = match args.algorithm {
        Algorithm::Pagerank => algorithms::pagerank::run(
            Arc::clone(&ctx),
            &topology,
            thread_count,
            binding,
            args.damping,
            args.num_iterations as u64,
        )?,
        Algorithm::Bfs => algorithms::bfs::run(Arc::clone(&ctx), &topology, thread_count, binding, None)?,
        Algorithm::Cc => algorithms::connected_components::run(
            Arc::clone(&ctx),
            &topology,
            thread_count,
            binding,
            None,
        )?,
    };
    let elapsed = exec_start.elapsed();

    print_statistics(&args, &ctx, &stats, elapsed);

    if let Some(output_path) = &args.output {
        write_ranks(output_path, &ctx)?;
    }

    Ok(())
}

fn print_statistics(
    args: &Args,
    ctx: &grazelle::GraphContext,
    stats: &RunStats,
    elapsed: std::time::Duration,
) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!();
    println!("------------ EXECUTION STATISTICS ------------");
    println!("{:<25} = {:.2}ms", "Running Time", ms);
    if stats.total_iterations_executed > 0 {
        let mega_edges = ctx.num_edges as f64 * stats.total_iterations_executed as f64 / (ms / 1000.0) / 1_000_000.0;
        println!("{:<25} = {:.0} Medges/sec", "Effective Processing Rate", mega_edges);
    }

    if args.algorithm == Algorithm::Pagerank {
        let prop = ctx.prop.get_ref();
        let sum: f64 = (0..ctx.num_vertices as usize)
            .map(|v| {
                let outdeg = ctx.outdeg[v];
                let denom = if outdeg == 0 { ctx.num_vertices } else { outdeg };
                prop[v] * denom as f64
            })
            .sum();
        println!("{:<25} = {:.10}", "PageRank Sum", sum);
    }

    println!("{:<25} = {}", "Total Iterations", stats.total_iterations_executed);
    println!("{:<25} = {}", "Pull-Based Iterations", stats.total_iterations_used_gather);
    println!("{:<25} = {}", "Push-Based Iterations", stats.total_iterations_used_scatter);
    println!("------------------------------------------------");
}

fn write_ranks(path: &std::path::Path, ctx: &grazelle::GraphContext) -> Result<(), GrazelleError> {
    let file = std::fs::File::create(path).map_err(|source| GrazelleError::GraphFileOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = std::io::BufWriter::new(file);
    let prop = ctx.prop.get_ref();

    for v in 0..ctx.num_vertices as usize {
        writeln!(writer, "{v} {}", prop[v]).map_err(|_| GrazelleError::GraphFileRead { path: path.to_path_buf() })?;
    }

    writer.flush().map_err(|_| GrazelleError::GraphFileRead { path: path.to_path_buf() })
}
