use clap::Parser;

fn parse_u64_with_hex(input: &str) -> Result<u64, String> {
    let s = input.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("invalid hex value '{input}': {e}"))
    } else {
        s.parse::<u64>()
            .map_err(|e| format!("invalid decimal value '{input}': {e}"))
    }
}

#[derive(Debug, Parser)]
#[command(name = "rlink", version)]
pub struct Args {
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,

    #[arg(short = 'b', long = "base", value_parser = parse_u64_with_hex)]
    pub base_address: Option<u64>,

    #[arg(long = "page-size", value_parser = parse_u64_with_hex)]
    pub page_size: Option<u64>,

    #[arg(short = 'e', long = "align", value_parser = parse_u64_with_hex)]
    pub align: Option<u64>,

    #[arg(long = "verbose", short = 'v')]
    pub verbose: bool,

    #[arg(value_name = "INPUT")]
    pub inputs: Vec<String>,
}
