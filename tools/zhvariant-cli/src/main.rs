use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, IsTerminal, Read, Write};
use std::path::Path;
use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Command};
use encoding_rs::Encoding;
use encoding_rs_io::DecodeReaderBytesBuilder;
use tracing_subscriber::EnvFilter;

use zhvariant::{Config, Dictionary, Pipeline, RequestSignals, RouteRule, SideEffect, Variant};

const BLUE: &str = "\x1B[1;34m";
const RESET: &str = "\x1B[0m";

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn read_input(input: &mut dyn Read) -> Result<Vec<u8>, io::Error> {
    let mut buffer = Vec::new();
    input.read_to_end(&mut buffer)?;
    // UTF-8 BOM: EF BB BF
    if buffer.starts_with(&[0xEF, 0xBB, 0xBF]) {
        buffer.drain(0..3);
    }
    Ok(buffer)
}

fn decode_input(buffer: &[u8], in_enc: &str) -> Result<String, io::Error> {
    if in_enc.eq_ignore_ascii_case("UTF-8") {
        return Ok(String::from_utf8_lossy(buffer).into_owned());
    }
    let encoding = Encoding::for_label(in_enc.as_bytes()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Unsupported input encoding: {}", in_enc),
        )
    })?;
    let mut decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .build(buffer);
    let mut decoded = String::new();
    decoder.read_to_string(&mut decoded)?;
    Ok(decoded)
}

fn encode_and_write_output(text: &str, out_enc: &str, output: &mut dyn Write) -> Result<(), io::Error> {
    if out_enc.eq_ignore_ascii_case("UTF-8") {
        return output.write_all(text.as_bytes());
    }
    let encoding = Encoding::for_label(out_enc.as_bytes()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Unsupported output encoding: {}", out_enc),
        )
    })?;
    let (encoded_bytes, _, _) = encoding.encode(text);
    output.write_all(&encoded_bytes)
}

/// A directory of `*.txt` tables or a compressed bundle file.
fn load_dictionary(path: &str) -> CliResult<Dictionary> {
    let dictionary = if Path::new(path).is_dir() {
        Dictionary::from_dir(path)?
    } else {
        Dictionary::load_compressed(path)?
    };
    Ok(dictionary)
}

fn load_config(matches: &ArgMatches) -> CliResult<Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(style) = matches.get_one::<String>("style") {
        config.style = serde_json::from_value(serde_json::Value::String(style.clone()))?;
    }
    if let Some(codes) = matches.get_one::<String>("enabled") {
        config.enabled = codes
            .split(',')
            .map(|c| c.parse::<Variant>())
            .collect::<Result<_, _>>()?;
    }
    config.validate()?;
    Ok(config)
}

fn config_args() -> [Arg; 3] {
    [
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("file")
            .help("JSON configuration file."),
        Arg::new("style")
            .long("style")
            .value_name("style")
            .value_parser(["query", "suffix", "prefix"])
            .help("Override the addressing style."),
        Arg::new("enabled")
            .long("enabled")
            .value_name("codes")
            .help("Override enabled variants, comma separated (e.g. zh-cn,zh-tw)."),
    ]
}

fn run_convert(matches: &ArgMatches) -> CliResult<()> {
    let config = load_config(matches)?;
    let dict_path = matches
        .get_one::<String>("dict")
        .ok_or("missing --dict")?;
    let variant: Variant = matches
        .get_one::<String>("variant")
        .ok_or("missing --variant")?
        .parse()?;
    let in_enc = matches.get_one::<String>("in_enc").map_or("UTF-8", String::as_str);
    let out_enc = matches.get_one::<String>("out_enc").map_or("UTF-8", String::as_str);
    let input_file = matches.get_one::<String>("input");
    let output_file = matches.get_one::<String>("output");

    let pipeline = Pipeline::new(config, Arc::new(load_dictionary(dict_path)?))?;

    let mut input: Box<dyn Read> = match input_file {
        Some(file_name) => Box::new(BufReader::new(File::open(file_name)?)),
        None => {
            if io::stdin().is_terminal() {
                eprintln!("{BLUE}Input text to convert, <ctrl-z> or <ctrl-d> to submit:{RESET}");
            }
            Box::new(io::stdin())
        }
    };
    let buffer = read_input(&mut *input)?;
    let text = decode_input(&buffer, in_enc)?;

    let converted = if matches.get_flag("document") {
        let home = pipeline.config().home_url.clone();
        let url = pipeline.links().rewrite_link(&home, variant);
        let ctx = pipeline.begin_request(&RequestSignals {
            url: &url,
            param: Some(variant.code()),
            ..Default::default()
        });
        pipeline.convert_document(&ctx, &text)
    } else {
        pipeline.convert(&text, variant)
    };

    let mut output = BufWriter::new(match output_file {
        Some(file_name) => Box::new(File::create(file_name)?) as Box<dyn Write>,
        None => Box::new(io::stdout()) as Box<dyn Write>,
    });
    encode_and_write_output(&converted, out_enc, &mut output)?;
    output.flush()?;

    eprintln!(
        "{BLUE}Conversion completed ({variant}): {} -> {}{RESET}",
        input_file.map_or("<stdin>", String::as_str),
        output_file.map_or("stdout", String::as_str)
    );
    Ok(())
}

fn run_bundle(matches: &ArgMatches) -> CliResult<()> {
    let dir = matches.get_one::<String>("dir").ok_or("missing --dir")?;
    let output = matches.get_one::<String>("output").ok_or("missing --output")?;
    let dictionary = Dictionary::from_dir(dir)?;
    dictionary.save_compressed(output)?;
    eprintln!(
        "{BLUE}Bundled {} tables: {} -> {}{RESET}",
        dictionary.len(),
        dir,
        output
    );
    for name in dictionary.names() {
        let size = dictionary.table(name).map_or(0, |t| t.len());
        println!("{name}\t{size}");
    }
    Ok(())
}

fn run_routes(matches: &ArgMatches) -> CliResult<()> {
    let config = load_config(matches)?;
    let base: Vec<RouteRule> = match matches.get_one::<String>("rules") {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Vec::new(),
    };
    let pipeline = Pipeline::new(config, Arc::new(Dictionary::new()))?;
    let table = pipeline.routes(&base);
    for rule in table.rules() {
        println!("{}\t{}", rule.pattern, rule.target);
    }
    if let Some(path) = matches.get_one::<String>("match") {
        match table.match_path(path) {
            Some(hit) => println!("{BLUE}{path} -> {} (rule {}){RESET}", hit.target, hit.index),
            None => println!("{BLUE}{path} -> no match{RESET}"),
        }
    }
    Ok(())
}

fn run_resolve(matches: &ArgMatches) -> CliResult<()> {
    let config = load_config(matches)?;
    let url = matches
        .get_one::<String>("url")
        .cloned()
        .unwrap_or_else(|| config.home_url.clone());
    let pipeline = Pipeline::new(config, Arc::new(Dictionary::new()))?;
    let signals = RequestSignals {
        url: &url,
        param: matches.get_one::<String>("param").map(String::as_str),
        cookie: matches.get_one::<String>("cookie").map(String::as_str),
        redirect_marker: matches.get_flag("redirect_marker"),
        accept_language: matches.get_one::<String>("accept_language").map(String::as_str),
        user_agent: matches.get_one::<String>("user_agent").map(String::as_str),
    };
    let ctx = pipeline.begin_request(&signals);

    println!("state:     {:?}", ctx.resolution.state);
    println!("source:    {}", ctx.resolution.source.as_str());
    println!("canonical: {}", ctx.canonical_url);
    for effect in ctx.effects() {
        match effect {
            SideEffect::SetCookie { name, value, max_age } => {
                println!("effect:    set cookie {name}={value} (max-age {}s)", max_age.as_secs())
            }
            SideEffect::SetRedirectMarker { name } => println!("effect:    set session cookie {name}"),
            SideEffect::ClearRedirectMarker { name } => println!("effect:    clear cookie {name}"),
            SideEffect::ConvertSearch => println!("effect:    convert search query"),
        }
    }
    for (variant, href) in &ctx.alternate_urls {
        println!("alternate: {}\t{}", variant.locale_tag(), href);
    }
    Ok(())
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let matches = Command::new("zhvariant")
        .about(format!("{BLUE}zhvariant: Chinese variant conversion and routing{RESET}"))
        .subcommand_required(true)
        .subcommand(
            Command::new("convert")
                .about("Convert text or an HTML document to a variant.")
                .args(config_args())
                .arg(
                    Arg::new("dict")
                        .short('d')
                        .long("dict")
                        .value_name("path")
                        .required(true)
                        .help("Dictionary directory of *.txt tables, or a compressed bundle."),
                )
                .arg(
                    Arg::new("variant")
                        .short('v')
                        .long("variant")
                        .value_name("code")
                        .required(true)
                        .help("Target variant: zh-cn|zh-tw|zh-hk|zh-hans|zh-hant|zh-sg|zh-mo|zh-my"),
                )
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_name("file")
                        .help("Read original text from <file>."),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("file")
                        .help("Write converted text to <file>."),
                )
                .arg(
                    Arg::new("document")
                        .long("document")
                        .action(ArgAction::SetTrue)
                        .help("Treat input as HTML: apply exclusions and rewrite links."),
                )
                .arg(
                    Arg::new("in_enc")
                        .long("in-enc")
                        .value_name("encoding")
                        .default_value("UTF-8")
                        .help("Encoding for input: UTF-8|GB2312|GBK|gb18030|BIG5"),
                )
                .arg(
                    Arg::new("out_enc")
                        .long("out-enc")
                        .value_name("encoding")
                        .default_value("UTF-8")
                        .help("Encoding for output: UTF-8|GB2312|GBK|gb18030|BIG5"),
                ),
        )
        .subcommand(
            Command::new("bundle")
                .about("Pack a directory of *.txt tables into a compressed bundle.")
                .arg(
                    Arg::new("dir")
                        .short('d')
                        .long("dir")
                        .value_name("dir")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("file")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("routes")
                .about("Print the compiled route table.")
                .args(config_args())
                .arg(
                    Arg::new("rules")
                        .short('r')
                        .long("rules")
                        .value_name("file")
                        .help("JSON array of {\"pattern\", \"target\"} base rules."),
                )
                .arg(
                    Arg::new("match")
                        .short('m')
                        .long("match")
                        .value_name("path")
                        .help("Match a request path against the table."),
                ),
        )
        .subcommand(
            Command::new("resolve")
                .about("Explain the variant decision for a request.")
                .args(config_args())
                .arg(Arg::new("url").long("url").value_name("url"))
                .arg(Arg::new("param").long("param").value_name("code"))
                .arg(Arg::new("cookie").long("cookie").value_name("value"))
                .arg(
                    Arg::new("redirect_marker")
                        .long("redirect-marker")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("accept_language")
                        .long("accept-language")
                        .value_name("header"),
                )
                .arg(Arg::new("user_agent").long("user-agent").value_name("header")),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("convert", sub)) => run_convert(sub),
        Some(("bundle", sub)) => run_bundle(sub),
        Some(("routes", sub)) => run_routes(sub),
        Some(("resolve", sub)) => run_resolve(sub),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zhvariant::AddressingStyle;

    #[test]
    fn decodes_legacy_encodings() {
        let (gbk, _, _) = encoding_rs::GBK.encode("头发");
        assert_eq!(decode_input(&gbk, "GBK").unwrap(), "头发");
        assert!(decode_input(b"x", "no-such-encoding").is_err());
    }

    #[test]
    fn style_override_parses() {
        let cmd = Command::new("t").args(config_args());
        let matches = cmd.get_matches_from(["t", "--style", "prefix", "--enabled", "zh-tw,zh-cn"]);
        let config = load_config(&matches).unwrap();
        assert_eq!(config.style, AddressingStyle::Prefix);
        assert_eq!(config.enabled.len(), 2);
    }
}
