use anyhow::Result;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use vigil::cli::VigilOpts;

fn main() -> Result<()> {
    let opts = Opts::parse();

    vigil::init_logger(Some(opts.verbosity.log_level_filter()));

    match vigil::cli::run(&opts.cli_opts) {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            vigil::utils::report_error(&e);
            std::process::exit(1);
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(name = "vigil")]
#[clap(about = "Audit policy filter engine")]
#[clap(version = vigil::metadata::VERSION)]
#[clap(disable_help_subcommand = true)]
struct Opts {
    #[command(flatten)]
    cli_opts: VigilOpts,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}
