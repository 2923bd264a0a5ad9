//! rollsync CLI: rdiff-style signature / delta / patch over files.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;

use clap::{ArgAction, Parser, Subcommand};

use rollsync::{
    Compression, Error, FrameReader, FrameWriter, Operation, RollSync, StreamKind, StrongHashKind,
    SyncBuilder,
};

/// Bound on a single literal payload, matching the wire format's DATA
/// limit.
const MAX_DATA_OP: usize = 1024 * 1024;

/// Capacity of the decode→apply operation queue.
const OP_QUEUE: usize = 32;

/// rsync-style delta encoding for files
#[derive(Parser)]
#[command(name = "rollsync")]
#[command(version)]
#[command(about = "Generate signatures and deltas, and patch files with them")]
struct Cli {
    /// Block size in KiB
    #[arg(long = "block", global = true, default_value_t = 6)]
    block_kib: u32,

    /// Emit and verify a whole-file content hash
    #[arg(long = "check", global = true, default_value_t = true, action = ArgAction::Set)]
    check: bool,

    /// Gzip-compress the delta stream
    #[arg(long = "zdelta", global = true, action = ArgAction::SetTrue)]
    zdelta: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the block signature of BASIS to SIGNATURE
    Signature {
        /// File the receiver already holds
        basis: PathBuf,
        /// Signature output path
        signature: PathBuf,
    },
    /// Compute a delta from SIGNATURE to NEWFILE, writing DELTA
    Delta {
        /// Signature of the receiver's file
        signature: PathBuf,
        /// File to transmit
        newfile: PathBuf,
        /// Delta output path
        delta: PathBuf,
    },
    /// Rebuild NEWFILE by applying DELTA to BASIS
    Patch {
        /// File the receiver already holds
        basis: PathBuf,
        /// Delta input path
        delta: PathBuf,
        /// Reconstructed output path
        newfile: PathBuf,
    },
    /// Compare two files byte for byte
    Test {
        /// First file
        first: PathBuf,
        /// Second file
        second: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                // Usage error.
                ExitCode::from(1)
            } else {
                // --help / --version.
                ExitCode::SUCCESS
            };
        }
    };

    if cli.block_kib == 0 {
        eprintln!("error: block size must be positive");
        return ExitCode::from(1);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> rollsync::Result<()> {
    match &cli.command {
        Commands::Signature { basis, signature } => {
            run_signature(cli.block_kib, basis, signature)
        }
        Commands::Delta {
            signature,
            newfile,
            delta,
        } => run_delta(cli, signature, newfile, delta),
        Commands::Patch {
            basis,
            delta,
            newfile,
        } => run_patch(cli, basis, delta, newfile),
        Commands::Test { first, second } => run_test(first, second),
    }
}

fn engine(block_size: usize) -> RollSync {
    SyncBuilder::new()
        .block_size(block_size)
        .max_data_op(MAX_DATA_OP)
        .build()
}

fn run_signature(block_kib: u32, basis: &Path, sig_out: &Path) -> rollsync::Result<()> {
    let sync = engine(block_kib as usize * 1024);

    let basis_file = BufReader::new(File::open(basis)?);
    let out = BufWriter::new(File::create(sig_out)?);

    let mut writer = FrameWriter::new(
        out,
        StreamKind::Signature,
        Compression::None,
        sync.block_size() as u32,
    )?;

    let mut blocks = 0u64;
    sync.create_signature(basis_file, |block| {
        blocks += 1;
        writer.write_block_hash(&block)
    })?;
    writer.finish()?.flush()?;

    println!(
        "{}: {} blocks of {} bytes",
        sig_out.display(),
        blocks,
        sync.block_size()
    );
    Ok(())
}

fn run_delta(cli: &Cli, sig_in: &Path, newfile: &Path, delta_out: &Path) -> rollsync::Result<()> {
    let mut sig_reader = FrameReader::new(
        BufReader::new(File::open(sig_in)?),
        StreamKind::Signature,
    )?;
    // The delta must slice the source the way the signature sliced the
    // basis, so the header's block size wins over --block.
    let block_size = checked_block_size(sig_reader.block_size())?;
    let signature = sig_reader.read_signature()?;

    let sync = engine(block_size);
    let source = BufReader::new(File::open(newfile)?);
    let out = BufWriter::new(File::create(delta_out)?);

    let compression = if cli.zdelta {
        Compression::Gzip
    } else {
        Compression::None
    };
    let mut writer = FrameWriter::new(out, StreamKind::Delta, compression, block_size as u32)?;

    let mut hasher = cli.check.then(|| StrongHashKind::Md5.hasher());
    let mut copied = 0u64;
    let mut literal = 0u64;
    {
        let hasher_ref = match &mut hasher {
            Some(h) => Some(h.as_mut()),
            None => None,
        };
        sync.create_delta(
            source,
            &signature,
            |op| {
                match &op {
                    Operation::Data(bytes) => literal += bytes.len() as u64,
                    _ => copied += 1,
                }
                writer.write_operation(&op)
            },
            hasher_ref,
        )?;
    }
    if let Some(mut hasher) = hasher {
        writer.write_operation(&Operation::hash(hasher.finish()))?;
    }
    writer.finish()?.flush()?;

    println!(
        "{}: {} block refs, {} literal bytes",
        delta_out.display(),
        copied,
        literal
    );
    Ok(())
}

fn run_patch(cli: &Cli, basis: &Path, delta_in: &Path, newfile: &Path) -> rollsync::Result<()> {
    let mut delta_reader =
        FrameReader::new(BufReader::new(File::open(delta_in)?), StreamKind::Delta)?;
    let block_size = checked_block_size(delta_reader.block_size())?;

    let sync = engine(block_size);
    let mut basis_file = File::open(basis)?;
    let mut out = BufWriter::new(File::create(newfile)?);

    let (op_tx, op_rx) = mpsc::sync_channel::<Operation<'static>>(OP_QUEUE);
    let (hash_tx, hash_rx) = mpsc::sync_channel::<Operation<'static>>(2);

    let mut hasher = cli.check.then(|| StrongHashKind::Md5.hasher());

    // Decode on a second thread; the bounded queue provides the
    // backpressure between decode and apply.
    {
        let hasher_ref = match &mut hasher {
            Some(h) => Some(h.as_mut()),
            None => None,
        };
        thread::scope(|scope| {
            let decoder = scope.spawn(move || {
                delta_reader.read_operations(
                    |op| op_tx.send(op).map_err(|_| Error::PipelineClosed),
                    |op| hash_tx.send(op).map_err(|_| Error::PipelineClosed),
                )
            });

            let applied = sync.apply_delta(&mut basis_file, op_rx.iter(), &mut out, hasher_ref);
            let decoded = decoder.join().expect("decoder thread panicked");
            applied.and(decoded)
        })?;
    }
    out.flush()?;

    if let Some(mut hasher) = hasher {
        match hash_rx.try_recv() {
            Ok(Operation::Hash(expected)) => {
                let actual = hasher.finish();
                if expected.as_ref() != actual.as_slice() {
                    return Err(Error::HashMismatch {
                        expected: expected.into_owned(),
                        actual,
                    });
                }
            }
            _ => return Err(Error::MissingHash),
        }
    }

    println!("{}: patched", newfile.display());
    Ok(())
}

fn run_test(first: &Path, second: &Path) -> rollsync::Result<()> {
    let mut a = File::open(first)?;
    let mut b = File::open(second)?;

    let len_a = a.metadata()?.len();
    let len_b = b.metadata()?.len();
    if len_a != len_b {
        return Err(invalid_data(format!(
            "file sizes differ: {len_a} vs {len_b} bytes"
        )));
    }

    let mut buf_a = vec![0u8; 32 * 1024];
    let mut buf_b = vec![0u8; 32 * 1024];
    let mut position = 0u64;
    loop {
        let n = a.read(&mut buf_a)?;
        if n == 0 {
            break;
        }
        b.read_exact(&mut buf_b[..n])?;
        if let Some(i) = (0..n).find(|&i| buf_a[i] != buf_b[i]) {
            return Err(invalid_data(format!(
                "files differ at byte {}",
                position + i as u64
            )));
        }
        position += n as u64;
    }

    println!("files match ({position} bytes)");
    Ok(())
}

fn checked_block_size(block_size: u32) -> rollsync::Result<usize> {
    if block_size == 0 {
        return Err(invalid_data("stream header carries a zero block size".into()));
    }
    Ok(block_size as usize)
}

fn invalid_data(message: String) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, message))
}
