//! Reading and writing trace files. `-` stands for stdin / stdout.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};

pub fn read_trace<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let mut text = String::new();

    if path == Path::new("-") {
        io::stdin().read_to_string(&mut text).context("unable to read trace from stdin")?;
    } else {
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut text))
            .with_context(|| format!("unable to read trace file {}", path.display()))?;
    }

    Ok(text)
}

pub fn write_trace<P: AsRef<Path>>(path: P, text: &str) -> Result<()> {
    let path = path.as_ref();

    if path == Path::new("-") {
        io::stdout().write_all(text.as_bytes()).context("unable to write trace to stdout")?;
    } else {
        File::create(path)
            .and_then(|mut file| file.write_all(text.as_bytes()))
            .with_context(|| format!("unable to write trace file {}", path.display()))?;
    }

    Ok(())
}
