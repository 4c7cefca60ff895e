//! ftrender - render a line of text with a fallback font chain to PNG

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use std::path::PathBuf;

use ftfont::config::Config;
use ftfont::font::{fontconfig, FontId, FontOptions, FontRegistry, FontSource, LoadFlags};

/// Command line settings; unset values come from the config file
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    primary: Option<String>,
    fallbacks: Vec<String>,
    size: Option<f64>,
    dpi: Option<f64>,
    angle: f64,
    hinting_factor: Option<i64>,
    no_aa: bool,
    output: Option<PathBuf>,
    info: bool,
    text: Option<String>,
}

fn print_help() {
    println!(
        r#"ftrender {} - render text with FreeType and a fallback font chain

USAGE:
    ftrender [OPTIONS] TEXT

OPTIONS:
    -h, --help                  Print this help message
    -V, --version               Print version information
    -c, --config PATH           Use this config file
    -f, --font FONT             Primary font (family name or file path)
    --fallback FONT             Add a fallback font (repeatable, searched in order)
    -s, --size PT               Font size in points
    --dpi DPI                   Resolution
    -a, --angle DEG             Rotate the text counter-clockwise
    --hinting-factor N          Horizontal hinting oversampling (1 = none)
    --no-aa                     1-bit rendering instead of gray coverage
    -o, --output PATH           PNG file to write
    -i, --info                  Print font and layout information
    --init-config               Write a config template and exit

EXAMPLES:
    ftrender "Hello, world"
    ftrender -f "DejaVu Sans" --fallback "Noto Sans CJK JP" -s 24 "abc 日本語"
    ftrender -f ./MyFont.otf -a 30 -o rotated.png "Tilted"

CONFIG FILE:
    ~/.config/ftfont/config.toml (override with FTFONT_CONFIG)
"#,
        env!("CARGO_PKG_VERSION")
    );
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        let flag = arg.as_str();
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} requires a value", flag))
        };
        match flag {
            "-c" | "--config" => parsed.config = Some(PathBuf::from(value(flag)?)),
            "-f" | "--font" => parsed.primary = Some(value(flag)?),
            "--fallback" => parsed.fallbacks.push(value(flag)?),
            "-s" | "--size" => parsed.size = Some(parse_number(flag, &value(flag)?)?),
            "--dpi" => parsed.dpi = Some(parse_number(flag, &value(flag)?)?),
            "-a" | "--angle" => parsed.angle = parse_number(flag, &value(flag)?)?,
            "--hinting-factor" => {
                let v = value(flag)?;
                parsed.hinting_factor = Some(
                    v.parse()
                        .with_context(|| format!("{}: invalid integer \"{}\"", flag, v))?,
                );
            }
            "--no-aa" => parsed.no_aa = true,
            "-o" | "--output" => parsed.output = Some(PathBuf::from(value(flag)?)),
            "-i" | "--info" => parsed.info = true,
            other if other.starts_with('-') && other.len() > 1 => {
                bail!("Unknown option: {} (see --help)", other)
            }
            text => {
                if parsed.text.is_some() {
                    bail!("Only one TEXT argument is accepted");
                }
                parsed.text = Some(text.to_string());
            }
        }
    }

    Ok(parsed)
}

fn parse_number(flag: &str, value: &str) -> Result<f64> {
    value
        .parse()
        .with_context(|| format!("{}: invalid number \"{}\"", flag, value))
}

/// Open a resolved font file and register it
fn open_font(registry: &mut FontRegistry, path: PathBuf, options: FontOptions) -> Result<FontId> {
    let shown = path.display().to_string();
    registry
        .open(FontSource::Path(path), options)
        .with_context(|| format!("Failed to open font {}", shown))
}

fn render(config: &Config, args: &Args, text: &str) -> Result<()> {
    let font = &config.font;
    let hinting_factor = args.hinting_factor.unwrap_or(font.hinting_factor);
    let options = || {
        FontOptions::default()
            .hinting_factor(hinting_factor)
            .kerning_factor(font.kerning_factor)
    };

    let mut registry = FontRegistry::new();
    let mut chain = Vec::new();
    for path in fontconfig::resolve_chain(font.fallbacks.iter().chain(&args.fallbacks))? {
        chain.push(open_font(&mut registry, path, options())?);
    }
    for path in fontconfig::resolve_chain(&font.last_resort)? {
        chain.push(open_font(&mut registry, path, options().warn_if_used(true))?);
    }

    let primary_specifier = args.primary.clone().unwrap_or_else(|| font.primary.clone());
    let primary_path = if primary_specifier.is_empty() {
        fontconfig::find_system_font()?
    } else {
        fontconfig::resolve_font(&primary_specifier)?
    };
    let primary = open_font(&mut registry, primary_path, options().fallbacks(chain))?;

    let size = args.size.unwrap_or(font.size);
    let dpi = args.dpi.unwrap_or(font.dpi);
    registry.set_size(primary, size, dpi)?;

    let layout = registry.set_text_str(primary, text, args.angle, LoadFlags::FORCE_AUTOHINT)?;
    info!(
        "Laid out {} glyphs ({} missing)",
        layout.len(),
        layout.misses.len()
    );

    let antialiased = font.antialiased && !args.no_aa;
    let (width, height) = {
        let image = registry.draw_glyphs_to_bitmap(primary, antialiased)?;
        (image.width(), image.height())
    };

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.path));
    registry.get(primary)?.image().save_png(&output)?;
    println!("{} ({}x{})", output.display(), width, height);

    if args.info {
        print_info(&registry, primary, &layout)?;
    }
    Ok(())
}

fn print_info(registry: &FontRegistry, primary: FontId, layout: &ftfont::font::Layout) -> Result<()> {
    let handle = registry.get(primary)?;
    let info = handle.info();
    println!(
        "Font:     {} {} ({})",
        info.family_name.as_deref().unwrap_or("?"),
        info.style_name.as_deref().unwrap_or(""),
        handle.path().map(|p| p.display().to_string()).unwrap_or_default()
    );
    println!(
        "Glyphs:   {}  units/EM: {}  charmaps: {}",
        info.num_glyphs, info.units_per_em, info.num_charmaps
    );
    for id in registry.chain(primary)?.into_iter().skip(1) {
        let fallback = registry.get(id)?;
        println!(
            "Fallback: {}{}",
            fallback.family_name().unwrap_or_default(),
            if fallback.warn_if_used() { " (last resort)" } else { "" }
        );
    }

    let (width, height) = handle.get_width_height();
    println!(
        "Extent:   {:.2} x {:.2} px, descent {:.2} px",
        width as f64 / 64.0,
        height as f64 / 64.0,
        handle.get_descent() as f64 / 64.0
    );
    for miss in &layout.misses {
        println!(
            "Missing:  #{} U+{:04X} ({:?})",
            miss.index, miss.charcode, miss.kind
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let raw: Vec<String> = std::env::args().collect();

    // --help
    if raw.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    // --version
    if raw.iter().any(|a| a == "--version" || a == "-V") {
        println!("ftrender {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if raw.iter().any(|a| a == "--init-config") {
        let path = Config::write_template()?;
        println!("Config file generated: {}", path.display());
        return Ok(());
    }

    let args = parse_args(&raw)?;
    let config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load(),
    };

    let Some(text) = args.text.as_deref() else {
        print_help();
        bail!("No TEXT given");
    };

    render(&config, &args, text)
}
