//! Interactive selection of run options

use std::io::{self, BufRead, IsTerminal, Write};

use serverbench_core::{Catalogue, ResourceClass, RuntimeOptions};

/// Whether stdin is an interactive terminal
pub fn stdin_is_terminal() -> bool {
    io::stdin().is_terminal()
}

/// Ask for servers, resources, capacity and warmup on stdin/stdout
pub fn prompt_options(catalogue: &Catalogue) -> io::Result<RuntimeOptions> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    prompt_with(catalogue, &mut input, &mut output)
}

/// Read one answer; `None` on end of input
fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> io::Result<Option<String>> {
    write!(output, "{}: ", question)?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        writeln!(output)?;
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Ask until the answer parses; blank or end of input keeps the default
fn ask_parsed<R, W, T, F>(
    input: &mut R,
    output: &mut W,
    question: &str,
    parse: F,
) -> io::Result<Option<T>>
where
    R: BufRead,
    W: Write,
    F: Fn(&str) -> Result<T, String>,
{
    loop {
        let Some(answer) = ask(input, output, question)? else {
            return Ok(None);
        };
        if answer.is_empty() {
            return Ok(None);
        }
        match parse(&answer) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => writeln!(output, "  {}", e)?,
        }
    }
}

fn parse_list<T>(raw: &str, item: impl Fn(&str) -> Result<T, String>) -> Result<Vec<T>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(item)
        .collect()
}

fn parse_positive(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("capacity must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a positive integer", raw)),
    }
}

/// Prompt over arbitrary streams
pub fn prompt_with<R: BufRead, W: Write>(
    catalogue: &Catalogue,
    input: &mut R,
    output: &mut W,
) -> io::Result<RuntimeOptions> {
    writeln!(output, "Available servers:")?;
    for (i, spec) in catalogue.servers.iter().enumerate() {
        writeln!(output, "  {}. {} ({})", i + 1, spec.name, spec.image)?;
    }

    let known: Vec<&str> = catalogue.server_names();
    let servers = ask_parsed(
        input,
        output,
        "Servers, comma-separated (blank = all)",
        |raw| {
            parse_list(raw, |name| {
                // accept the listed number as well as the name
                match name.parse::<usize>() {
                    Ok(n) if (1..=known.len()).contains(&n) => Ok(known[n - 1].to_string()),
                    _ => Ok(name.to_string()),
                }
            })
        },
    )?
    .unwrap_or_default();

    let defaults: Vec<&str> = catalogue
        .benchmark
        .resources
        .iter()
        .map(ResourceClass::as_str)
        .collect();
    let resources = ask_parsed(
        input,
        output,
        &format!("Resources: cpu, io, mixed [{}]", defaults.join(",")),
        |raw| parse_list(raw, |s| s.parse::<ResourceClass>()),
    )?
    .filter(|v: &Vec<ResourceClass>| !v.is_empty());

    let defaults: Vec<String> = catalogue
        .benchmark
        .capacity
        .iter()
        .map(|c| c.to_string())
        .collect();
    let capacity = ask_parsed(
        input,
        output,
        &format!("Capacity [{}]", defaults.join(",")),
        |raw| parse_list(raw, parse_positive),
    )?
    .filter(|v: &Vec<usize>| !v.is_empty());

    let warmup = ask_parsed(
        input,
        output,
        &format!("Warmup requests [{}]", catalogue.benchmark.warmup.requests),
        |raw| {
            raw.parse::<usize>()
                .map_err(|_| format!("'{}' is not a non-negative integer", raw))
        },
    )?;

    Ok(RuntimeOptions {
        warmup,
        resources,
        capacity,
        servers,
        results_dir: None,
    })
}
