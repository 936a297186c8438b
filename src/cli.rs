use {
    crate::{
        common::{debug_println, DEBUG},
        compiler::{self, CompileOptions},
    },
    backend::emit::DEFAULT_OUTPUT,
    clap::{Parser, Subcommand},
    std::sync::atomic::Ordering,
};

#[derive(Debug, Parser)]
#[command(version, about = "Compiles Go functions that yield into durable coroutines")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate the durable form of the functions that yield
    Compile {
        /// Package directory, Go file, or `dir/...` for every package below dir
        #[arg(default_value = ".")]
        path: String,

        #[command(flatten)]
        compile_args: CompileArgs,
    },
    /// Compile a package in memory and drive one of its functions as a coroutine
    Run {
        /// Go file or package directory
        path: String,

        /// Function to drive
        #[arg(long, default_value = "main")]
        entry: String,

        /// Resume every step from a snapshot of the coroutine stack
        #[arg(long)]
        restart: bool,

        /// Arguments of the entry function; integers unless they fail to parse
        args: Vec<String>,
    },
}

#[derive(Debug, Parser)]
struct CompileArgs {
    /// Name of the file generated in each package directory
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: String,

    /// Build constraint for the generated files, e.g. `durable`
    #[arg(long)]
    tags: Option<String>,
}

impl From<CompileArgs> for CompileOptions {
    fn from(args: CompileArgs) -> Self {
        CompileOptions {
            output_filename: args.output,
            build_tags: args.tags,
        }
    }
}

pub(crate) fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    DEBUG.store(cli.debug, Ordering::Relaxed);
    debug_println!("{cli:#?}");
    match cli.command {
        Command::Compile { path, compile_args } => {
            let written = compiler::compile(&path, &compile_args.into())?;
            for path in written {
                println!("{}", path.display());
            }
        }
        Command::Run {
            path,
            entry,
            restart,
            args,
        } => compiler::run(&path, &entry, &args, restart)?,
    }
    Ok(())
}
