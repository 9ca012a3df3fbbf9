//! polythene CLI - export container rootfs trees and run commands inside them

use clap::Parser;
use polythene::cli::{cmd_exec, cmd_pull, Args, SubCommand};
use polythene::{logging, Config, SystemToolbox};

fn main() {
    let args = Args::parse();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn run(args: Args) -> polythene::Result<i32> {
    match args.command {
        SubCommand::Pull { image, common } => {
            let config = Config::from_env()
                .with_store(common.store)
                .with_verbose(args.verbose);
            logging::init(config.verbose);

            let uuid = cmd_pull(&config, &image, common.timeout)?;
            println!("{}", uuid);
            Ok(0)
        }

        SubCommand::Exec {
            uuid,
            common,
            isolation,
            command,
        } => {
            let config = Config::from_env()
                .with_store(common.store)
                .with_verbose(args.verbose);
            logging::init(config.verbose);

            cmd_exec(
                &config,
                &uuid,
                &command,
                common.timeout,
                isolation,
                &SystemToolbox,
            )
        }
    }
}
