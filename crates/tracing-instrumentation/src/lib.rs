// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

use kafscope_types::config::{LogFormat, LogOptions};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "cannot parse log filter (from the configuration or the {} environment variable): {0}",
        EnvFilter::DEFAULT_ENV
    )]
    LogDirectiveParseError(#[from] ParseError),
    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// `RUST_LOG` wins over the configured filter.
fn build_filter(opts: &LogOptions) -> Result<EnvFilter, Error> {
    let directives = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => directives,
        _ => opts.filter.clone(),
    };
    Ok(EnvFilter::try_new(directives)?)
}

fn open_log_file(path: &Path) -> Result<File, Error> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::LogFile {
            path: path.to_owned(),
            source,
        })
}

fn build_logging_layer<S>(opts: &LogOptions) -> Result<Box<dyn Layer<S> + Send + Sync>, Error>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    // no colors in files
    let (writer, ansi) = match &opts.file {
        Some(path) => (BoxMakeWriter::new(Mutex::new(open_log_file(path)?)), false),
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let layer = match opts.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .boxed(),
    };
    Ok(layer)
}

/// Installs the global log subscriber. Logs go to the configured file, or to stderr when
/// none is set.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(opts: &LogOptions) -> Result<TracingGuard, Error> {
    let filter = build_filter(opts)?;
    let (filter, reload_handle) = tracing_subscriber::reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(build_logging_layer(opts)?.with_filter(filter))
        .try_init()?;

    Ok(TracingGuard { reload_handle })
}

#[derive(Debug)]
pub struct TracingGuard {
    reload_handle: Handle<EnvFilter, Registry>,
}

impl TracingGuard {
    pub fn reload_log_filter(&self, opts: &LogOptions) {
        info!("Setting log filter to '{}'", opts.filter);
        let _ = self.reload_handle.modify(|f| {
            match EnvFilter::try_new(&opts.filter) {
                Ok(new_filter) => *f = new_filter,
                // don't use logging here, tracing will panic!
                Err(e) => eprintln!("Failed to reload log filter: '{e}'"),
            }
        });
    }
}
