use clap::Parser;
use flexi_logger::{opt_format, Logger};
use islandpart::{dump_cfg_template, run_flow, Args};
use log::{error, LevelFilter};

fn main() {
	let args = Args::parse();
	let level = if args.verbose {
		LevelFilter::Debug
	} else {
		LevelFilter::Info
	};
	let _logger = match Logger::with(level).format(opt_format).log_to_stderr().start() {
		Ok(handle) => Some(handle),
		Err(e) => {
			eprintln!("Logger setup failed: {e}");
			None
		},
	};

	if args.dump_cfg {
		if let Err(e) = dump_cfg_template() {
			error!("{e:?}");
			std::process::exit(1);
		}
		return;
	}

	let to_stdout = args.output_file.is_none();
	match run_flow(args) {
		Ok(json) => {
			if to_stdout {
				println!("{json}");
			}
		},
		Err(e) => {
			error!("{e:?}");
			std::process::exit(1);
		},
	}
}
