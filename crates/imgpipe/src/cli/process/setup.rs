//! Run setup: config overrides, recipe assembly, input gathering.

use imgpipe_core::pipeline::select;
use imgpipe_core::{Config, InputDiscovery, PipelineRunner, Recipe};

use super::{ProcessArgs, ProcessContext};

/// Apply CLI overrides, build and check the recipe, and read the inputs.
///
/// Everything that can be rejected up front is rejected here, before any
/// item is decoded.
pub fn setup_run(args: &ProcessArgs, mut config: Config) -> anyhow::Result<ProcessContext> {
    if let Some(parallel) = args.parallel {
        config.processing.parallel_workers = parallel;
    }
    if let Some(ref dir) = args.output_dir {
        config.export.output_dir = dir.clone();
    }
    config.validate()?;

    let recipe = build_recipe(args)?;
    let runner = PipelineRunner::new(&config);
    if let Err(e) = recipe.validate(runner.stage_context()) {
        anyhow::bail!("{e}\n\n  Hint: Check the step parameters and try again.");
    }
    tracing::debug!("Recipe:\n{}", recipe.to_toml().unwrap_or_default());

    let discovery = InputDiscovery::new(config.processing.clone());
    let gathered = discovery.gather(&args.inputs);
    for error in &gathered.errors {
        tracing::error!("{error}");
    }

    let selection = select(gathered.candidates);
    let skipped = gathered.errors.len() + selection.rejected.len();
    for error in &selection.rejected {
        tracing::warn!("Skipped: {error}");
    }

    if selection.accepted.is_empty() {
        anyhow::bail!(
            "No image files to process ({skipped} input(s) skipped)\n\n  \
             Hint: Check the paths and the supported formats in `imgpipe config show`."
        );
    }
    tracing::info!("Found {} image(s) to process", selection.accepted.len());

    Ok(ProcessContext {
        config,
        runner,
        recipe,
        candidates: selection.accepted,
        skipped,
    })
}

/// Steps from `--recipe` first, then every `--step` in order.
fn build_recipe(args: &ProcessArgs) -> anyhow::Result<Recipe> {
    let mut recipe = match args.recipe {
        Some(ref path) => Recipe::load(path)?,
        None => Recipe::default(),
    };
    recipe.extend_from_args(&args.steps)?;
    if recipe.steps.is_empty() {
        anyhow::bail!("No transform steps given. Use --step KIND:KEY=VALUE or --recipe FILE.");
    }
    Ok(recipe)
}
