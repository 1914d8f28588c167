//! Segmenta entrypoint: drives the session through loading, cleaning,
//! fitting, selection, assignment, enrichment and export.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use segmenta::cli::MethodArg;
use segmenta::{data, viz, Args, Method, SegmentationSession};

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        println!("Segmenta - Segmentación de clientes");
        println!("===================================\n");
    }

    let start_time = Instant::now();
    let mut session = SegmentationSession::new();

    // 1. load
    if args.verbose {
        println!("Cargando datos desde: {}", args.input);
    }
    let table = data::read_table_from_path(&args.input)
        .with_context(|| format!("could not load '{}'", args.input))?;
    println!(
        "Datos cargados con {} filas y {} columnas.",
        table.height(),
        table.width()
    );
    session.load_table(table);

    // 2. variable selection + cleaning
    let numeric_vars = args.numeric_vars();
    let categorical_vars = args.categorical_vars();
    session
        .confirm_variables(&args.id_col, &numeric_vars, &categorical_vars)
        .context("variable selection failed")?;
    if args.verbose {
        println!("'{}' es un identificador válido.", args.id_col);
        if !numeric_vars.is_empty() {
            println!("Variables numéricas limpiadas: {numeric_vars:?}");
        }
        if !categorical_vars.is_empty() {
            println!("Variables categóricas: {categorical_vars:?}");
        }
    }

    // 3. fit + score + assign
    let method = args.method.to_method();
    match method {
        Method::Topics => {
            if args.verbose {
                println!("\nAjustando segmentación por tópicos con {} segmentos...", args.segments);
            }
            session
                .fit_topic_segments(args.segments, args.seed)
                .context("topic segmentation failed")?;
            println!("Segmentos asignados automáticamente ({} tópicos).", args.segments);
        }
        _ => {
            if args.verbose {
                println!(
                    "\nAjustando {} con k en [{}, {}]...",
                    method_name(args.method),
                    args.k_min,
                    args.k_max
                );
            }
            session
                .fit_models(method, args.k_min, args.k_max, args.seed)
                .context("model fitting failed")?;

            if let Some(metrics) = session.metrics() {
                println!("\nMétricas por k:");
                println!("{}", metrics.to_dataframe()?);
            }

            session
                .assign_clusters(args.select_k)
                .context("cluster assignment failed")?;
            if let Some(k) = session.selected_k() {
                println!("Clusters asignados automáticamente con {} (k = {k}).", method_name(args.method));
            }
            if args.verbose {
                if let (Some(family), Some(k), Some(features)) =
                    (session.family(), session.selected_k(), session.features())
                {
                    if let Some(model) = family.get(k) {
                        let score = model.selection_score(features)?;
                        println!("Puntaje de selección para k = {k}: {score:?}");
                    }
                }
            }
        }
    }

    print_cluster_summary(&session)?;

    // 4. optional projection scatter
    if let Some(plot_path) = &args.plot {
        match (session.features(), session.cluster_column()) {
            (Some(features), Some(_)) => {
                let family = session.family().context("no fitted family in session")?;
                let k = session.selected_k().context("no k selected")?;
                let model = family.get(k).context("selected k has no fitted model")?;
                let labels = model.predict(features);
                let scatter = viz::project(features, &labels, 2)?;
                viz::render_projection_png(&scatter, plot_path, None)?;
                println!("Proyección guardada en: {plot_path}");
            }
            _ => println!("La proyección requiere variables numéricas; se omite el gráfico."),
        }
    }

    // 5. optional demographic enrichment + export
    if let Some(demo_path) = &args.demo {
        let demo_vars = args.demographic_vars();
        if demo_vars.is_empty() {
            bail!("--demo-vars must name at least one demographic variable");
        }
        if args.verbose {
            println!("\nCargando datos demográficos desde: {demo_path}");
        }
        let demo = data::read_table_from_path(demo_path)
            .with_context(|| format!("could not load '{demo_path}'"))?;
        session
            .merge_demographics(&demo, args.demo_key.as_deref(), &demo_vars)
            .context("demographic merge failed")?;
        if let Some(merged) = session.merged() {
            println!("Merge realizado correctamente: {} filas.", merged.height());
        }

        let outcome = session.export_workbook().context("export failed")?;
        for skipped in &outcome.skipped {
            println!("Aviso: la variable '{skipped}' no se encontró tras el merge; se omite.");
        }
        std::fs::write(&args.output, &outcome.bytes)
            .with_context(|| format!("could not write '{}'", args.output))?;
        println!("Excel guardado en: {}", args.output);
    } else if args.verbose {
        println!("\nSin archivo demográfico; se omite el merge y la exportación.");
    }

    let elapsed = start_time.elapsed();
    println!("\n✓ Completado en {:.2?}", elapsed);
    Ok(())
}

fn method_name(method: MethodArg) -> &'static str {
    match method {
        MethodArg::Gmm => "GMM",
        MethodArg::Kmeans => "K-Means",
        MethodArg::Topics => "Tópicos",
    }
}

/// Print per-cluster sizes from the assigned working table.
fn print_cluster_summary(session: &SegmentationSession) -> Result<()> {
    let (table, cluster_col) = match (session.table(), session.cluster_column()) {
        (Some(table), Some(col)) => (table, col),
        _ => return Ok(()),
    };
    let share = viz::cluster_share(table, cluster_col)?;
    let total: u32 = share.counts.iter().sum();

    println!("\n=== Tamaños de cluster ===");
    for (cluster, count) in share.clusters.iter().zip(share.counts.iter()) {
        let percentage = f64::from(*count) / f64::from(total.max(1)) * 100.0;
        println!("  Cluster {cluster}: {count} filas ({percentage:.1}%)");
    }
    Ok(())
}
