use std::cell::Cell;

use log::{trace, SetLoggerError};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

thread_local! {
    /// Current depth of the tracing sessions on this thread
    static TRACE_DEPTH: Cell<usize> = Cell::new(0);
}

/// Tracer representing the context
pub struct Tracer {
    title: String,
    depth: usize,
}

impl Tracer {
    /// Create a tracing session
    pub fn new(title: String) -> Self {
        let depth = TRACE_DEPTH.with(|current| {
            let depth = current.get();
            current.set(depth + 1);
            depth
        });
        trace!("{}-> {}", "  ".repeat(depth), title);
        Self { title, depth }
    }

    /// Record a new event
    pub fn log(&self, event: &str) {
        trace!("{} {}", "  ".repeat(self.depth), event);
    }
}

impl Drop for Tracer {
    fn drop(&mut self) {
        let Self { title, depth } = self;
        trace!("{}<- {}", "  ".repeat(*depth), title);
        TRACE_DEPTH.with(|current| current.set(*depth));
    }
}

/// Setup the logging globally
pub fn setup(verbose: Option<usize>) -> Result<(), SetLoggerError> {
    let verbosity = match verbose.unwrap_or(0) {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(
        verbosity,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
}
