//! Lunar Lander headless entry point
//!
//! Flies the built-in autopilot over one or more seeds and prints one JSON
//! result record per run.
//!
//! Usage:
//!   lunar-lander [OPTIONS]
//!
//! Options:
//!   --seed N        RNG seed (default: 0)
//!   --runs N        Runs with incrementing seeds, in parallel (default: 1)
//!   --preset NAME   flat | hills | mountains | drift | ferry | drop |
//!                   plunge | climb | obstacles (default: hills)
//!   --lander KIND   classic | differential | simple (default: classic)
//!   --level FILE    Level JSON; overrides --preset
//!   --time SECONDS  Simulated time budget (default: 120)
//!   --land          Stop at the first landing

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::process;

    use lunar_lander::bot::Autopilot;
    use lunar_lander::config::{LanderKind, LevelConfig, LevelPreset};
    use lunar_lander::runner::{RunConfig, run_parallel};

    struct Args {
        seed: u64,
        runs: u64,
        preset: LevelPreset,
        lander: Option<LanderKind>,
        level_path: Option<String>,
        max_time: f32,
        stop_on_landing: bool,
    }

    impl Default for Args {
        fn default() -> Self {
            Self {
                seed: 0,
                runs: 1,
                preset: LevelPreset::default(),
                lander: None,
                level_path: None,
                max_time: 120.0,
                stop_on_landing: false,
            }
        }
    }

    fn usage() -> ! {
        eprintln!(
            "Lunar Lander headless runner\n\
             \n\
             Usage: lunar-lander [OPTIONS]\n\
             \n\
             Options:\n\
             \x20 --seed N        RNG seed (default: 0)\n\
             \x20 --runs N        Runs with incrementing seeds (default: 1)\n\
             \x20 --preset NAME   flat | hills | mountains | drift | ferry | drop |\n\
             \x20                plunge | climb | obstacles (default: hills)\n\
             \x20 --lander KIND   classic | differential | simple\n\
             \x20 --level FILE    Level JSON; overrides --preset\n\
             \x20 --time SECONDS  Simulated time budget (default: 120)\n\
             \x20 --land          Stop at the first landing\n\
             \x20 --help, -h      Show this help"
        );
        process::exit(2);
    }

    fn value<T: std::str::FromStr>(flag: &str, raw: Option<String>) -> T {
        match raw.and_then(|v| v.parse().ok()) {
            Some(v) => v,
            None => {
                eprintln!("{flag} requires a valid value");
                usage();
            }
        }
    }

    fn parse_args() -> Args {
        let mut args = Args::default();
        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--seed" => args.seed = value("--seed", it.next()),
                "--runs" => args.runs = value::<u64>("--runs", it.next()).max(1),
                "--time" => args.max_time = value("--time", it.next()),
                "--preset" => {
                    let name: String = value("--preset", it.next());
                    args.preset = LevelPreset::from_str(&name).unwrap_or_else(|| usage());
                }
                "--lander" => {
                    let name: String = value("--lander", it.next());
                    args.lander = Some(LanderKind::from_str(&name).unwrap_or_else(|| usage()));
                }
                "--level" => args.level_path = Some(value("--level", it.next())),
                "--land" => args.stop_on_landing = true,
                "--help" | "-h" => usage(),
                other => {
                    eprintln!("Unknown argument: {other}");
                    usage();
                }
            }
        }
        args
    }

    fn load_level(args: &Args) -> Result<LevelConfig, Box<dyn std::error::Error>> {
        let mut level = match &args.level_path {
            Some(path) => LevelConfig::from_json(&std::fs::read_to_string(path)?)?,
            None => LevelConfig::from_preset(args.preset),
        };
        if let Some(kind) = args.lander {
            level = level.with_lander(kind);
        }
        Ok(level)
    }

    pub fn main() -> Result<(), Box<dyn std::error::Error>> {
        env_logger::init();
        let args = parse_args();
        let level = load_level(&args)?;
        log::info!("Lunar Lander (headless) starting: level '{}'", level.name);

        let configs: Vec<RunConfig> = (0..args.runs)
            .map(|i| {
                let mut config = RunConfig::new(args.seed.wrapping_add(i), level.clone());
                config.max_time = Some(args.max_time);
                config.stop.on_first_landing = args.stop_on_landing;
                config
            })
            .collect();

        for result in run_parallel(&configs, Autopilot::new) {
            let result = result?;
            println!("{}", serde_json::to_string(&result)?);
        }
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    cli::main()
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The core is a library on the web; there is no headless binary there
}
