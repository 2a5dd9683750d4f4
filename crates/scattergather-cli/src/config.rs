use anyhow::bail;
use clap::Parser;
use scattergather::{
    ENCODED_DELIMITER_LEN, Locale, MAX_PAYLOAD_LEN, Principal, QueuePolicy, SplitPolicy,
    UNIFORM_ID_LEN,
};
use std::time::Duration;

/// Runtime configuration for the `scattergather` binary.
///
/// The binary splits a set of identifiers into bounded chunks, resolves every
/// chunk on a worker pool through a simulated remote lookup, and prints the
/// merged records. All values are parsed from CLI arguments or environment
/// variables, and a `.env` file in the working directory is honoured.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "scattergather",
    version,
    about = "Chunk an identifier lookup, fan it out over a worker pool, and merge the results"
)]
pub struct CliArgs {
    /// Identifiers to look up. Read from stdin (whitespace or comma separated)
    /// when none are given.
    pub ids: Vec<String>,

    /// Number of worker threads in the pool.
    ///
    /// Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS")]
    pub num_workers: Option<usize>,

    /// Maximum number of chunks waiting for a worker. Submission blocks while
    /// the queue is full. Unbounded when unset.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Largest serialized request a single lookup may carry, in bytes.
    ///
    /// Environment variable: `MAX_PAYLOAD_LEN`
    #[arg(long, env = "MAX_PAYLOAD_LEN", default_value_t = MAX_PAYLOAD_LEN)]
    pub max_payload_len: usize,

    /// Assumed length of one identifier including its encoded delimiter, used
    /// to size chunks.
    ///
    /// Environment variable: `ASSUMED_ID_LEN`
    #[arg(long, env = "ASSUMED_ID_LEN", default_value_t = UNIFORM_ID_LEN)]
    pub assumed_id_len: usize,

    /// Length of the encoded delimiter between two identifiers.
    ///
    /// Environment variable: `DELIMITER_LEN`
    #[arg(long, env = "DELIMITER_LEN", default_value_t = ENCODED_DELIMITER_LEN)]
    pub delimiter_len: usize,

    /// Locale the lookups run under.
    ///
    /// Environment variable: `LOCALE`
    #[arg(long, env = "LOCALE", default_value_t = String::from(Locale::DEFAULT_TAG))]
    pub locale: String,

    /// Principal the lookups run as. Anonymous when unset.
    ///
    /// Environment variable: `PRINCIPAL`
    #[arg(long, env = "PRINCIPAL")]
    pub principal: Option<String>,

    /// Roles granted to the principal. May be repeated.
    #[arg(long = "role", requires = "principal")]
    pub roles: Vec<String>,

    /// Simulated latency of every lookup, in milliseconds.
    ///
    /// Environment variable: `LATENCY_MS`
    #[arg(long, env = "LATENCY_MS", default_value_t = 0)]
    pub latency_ms: u64,

    /// Make the lookup of the chunk containing this identifier fail.
    #[arg(long)]
    pub fail_on: Option<String>,

    /// Skip capturing the caller's stack for diagnostics.
    #[arg(long, default_value_t = false)]
    pub no_trace: bool,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub ids: Vec<String>,
    pub num_workers: usize,
    pub queue: QueuePolicy,
    pub split_policy: SplitPolicy,
    pub locale: Locale,
    pub principal: Option<Principal>,
    pub latency: Duration,
    pub fail_on: Option<String>,
    pub capture_trace: bool,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let num_workers = args.num_workers.unwrap_or_else(num_cpus::get);
        if num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        let queue = match args.queue_capacity {
            None => QueuePolicy::Unbounded,
            Some(0) => bail!("QUEUE_CAPACITY must be greater than 0"),
            Some(capacity) => QueuePolicy::Bounded(capacity),
        };

        if args.locale.trim().is_empty() {
            bail!("LOCALE must not be empty");
        }

        let principal = match args.principal {
            Some(name) if name.trim().is_empty() => bail!("PRINCIPAL must not be empty"),
            Some(name) => Some(
                args.roles
                    .into_iter()
                    .fold(Principal::new(name), |p, role| p.with_role(role)),
            ),
            None => None,
        };

        let split_policy =
            SplitPolicy::new(args.max_payload_len, args.assumed_id_len, args.delimiter_len)?;

        Ok(Self {
            ids: args.ids,
            num_workers,
            queue,
            split_policy,
            locale: Locale::new(args.locale),
            principal,
            latency: Duration::from_millis(args.latency_ms),
            fail_on: args.fail_on,
            capture_trace: !args.no_trace,
        })
    }
}
