use crate::cmd::StatusArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_status, OutputFormat};

pub fn run(args: StatusArgs, format: OutputFormat) -> CliResult<i32> {
    print_status(args.code, format);
    Ok(SUCCESS)
}
