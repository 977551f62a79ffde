//! write-layout-info - Write the OSK layout manifest

use clap::Parser;
use log::error;
use osk_layout_tools::args::LayoutInfoArgs;
use osk_layout_tools::{logging, Manifest};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = LayoutInfoArgs::parse();
    logging::init(args.verbose);

    let result = Manifest::from_dir(&args.layouts, args.include_varnam()).and_then(|manifest| manifest.write(&args.out));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
