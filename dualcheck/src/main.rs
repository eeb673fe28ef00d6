// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use color_eyre::Result;
use dualcheck::{DualcheckApp, Harness, OutputWriter, StderrStyles, demo};

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = enable_ansi_support::enable_ansi_support();

    let app = match DualcheckApp::parse_from_args(std::env::args_os()) {
        Ok(app) => app,
        Err(error) => {
            error.display_to_stderr(&StderrStyles::default());
            std::process::exit(error.process_exit_code())
        }
    };
    let output = app.init_output();

    let (mut session, catalog) = demo::demo();
    let harness = Harness::new(&catalog).with_switcher(&mut session);

    match app.exec(harness, output, &mut OutputWriter::default()) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            error.display_to_stderr(&output.stderr_styles());
            std::process::exit(error.process_exit_code())
        }
    }
}
