use crate::input::{
    GridInput, HistogramInput, LoadInput, ProbeInput, ReportInput, ReservoirInput, SweepInput,
};
use proc_macro2::{Ident, Span};
use syn::parse::{Parse, ParseBuffer, ParseStream};
use syn::token::Brace;
use syn::{Error, Expr, Token, braced};

/// Parses `key: value` pairs separated by optional commas until `input` is
/// exhausted, handing every key to `field`.
fn parse_fields<'a, F>(input: &ParseBuffer<'a>, mut field: F) -> syn::Result<()>
where
    F: FnMut(&Ident, &ParseBuffer<'a>) -> syn::Result<()>,
{
    while !input.is_empty() {
        let key = input.parse::<Ident>()?;
        let _ = input.parse::<Token![:]>()?;

        field(&key, input)?;

        if input.peek(Token![,]) {
            input.parse::<Token![,]>()?;
        }
    }

    Ok(())
}

fn block<'a>(input: ParseStream<'a>) -> syn::Result<ParseBuffer<'a>> {
    if !input.peek(Brace) {
        return Err(input.error("missing a braced block"));
    }

    let content;
    braced!(content in input);
    Ok(content)
}

fn set<T>(slot: &mut Option<T>, key: &Ident, value: T) -> syn::Result<()> {
    if slot.is_some() {
        return Err(Error::new(key.span(), format!("duplicate '{key}' field")));
    }

    *slot = Some(value);
    Ok(())
}

fn required<T>(slot: Option<T>, name: &str, span: Span) -> syn::Result<T> {
    slot.ok_or_else(|| Error::new(span, format!("field '{name}' is missing")))
}

fn unknown(key: &Ident) -> Error {
    Error::new(key.span(), format!("field '{key}' is not recognized"))
}

impl Parse for ProbeInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut map = None;
        let mut grid = None;
        let mut load = None;
        let mut histogram = None;
        let mut report = None;

        parse_fields(input, |key, input| match key.to_string().as_str() {
            "map" => set(&mut map, key, input.parse::<Expr>()?),
            "grid" => set(&mut grid, key, input.parse::<GridInput>()?),
            "load" => set(&mut load, key, input.parse::<LoadInput>()?),
            "histogram" => set(&mut histogram, key, input.parse::<HistogramInput>()?),
            "report" => set(&mut report, key, input.parse::<ReportInput>()?),
            _ => Err(unknown(key)),
        })?;

        let span = input.span();

        Ok(ProbeInput {
            map: required(map, "map", span)?,
            grid: required(grid, "grid", span)?,
            load: required(load, "load", span)?,
            histogram: required(histogram, "histogram", span)?,
            report: required(report, "report", span)?,
        })
    }
}

impl Parse for GridInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let content = block(input)?;

        let mut partitions = None;
        let mut operation_threads = None;
        let mut event_threads = None;
        let mut sweep = None;

        parse_fields(&content, |key, content| match key.to_string().as_str() {
            "partitions" => set(&mut partitions, key, content.parse::<Expr>()?),
            "operation_threads" => set(&mut operation_threads, key, content.parse::<Expr>()?),
            "event_threads" => set(&mut event_threads, key, content.parse::<Expr>()?),
            "sweep" => set(&mut sweep, key, content.parse::<SweepInput>()?),
            _ => Err(unknown(key)),
        })?;

        let span = content.span();

        Ok(GridInput {
            partitions: required(partitions, "partitions", span)?,
            operation_threads: required(operation_threads, "operation_threads", span)?,
            event_threads: required(event_threads, "event_threads", span)?,
            sweep: required(sweep, "sweep", span)?,
        })
    }
}

impl Parse for SweepInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let content = block(input)?;

        let mut interval = None;
        let mut partitions = None;

        parse_fields(&content, |key, content| match key.to_string().as_str() {
            "interval" => set(&mut interval, key, content.parse::<Expr>()?),
            "partitions" => set(&mut partitions, key, content.parse::<Expr>()?),
            _ => Err(unknown(key)),
        })?;

        let span = content.span();

        Ok(SweepInput {
            interval: required(interval, "interval", span)?,
            partitions: required(partitions, "partitions", span)?,
        })
    }
}

impl Parse for LoadInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let content = block(input)?;

        let mut ttl = None;
        let mut repetitions = None;

        parse_fields(&content, |key, content| match key.to_string().as_str() {
            "ttl" => set(&mut ttl, key, content.parse::<Expr>()?),
            "repetitions" => set(&mut repetitions, key, content.parse::<Expr>()?),
            _ => Err(unknown(key)),
        })?;

        let span = content.span();

        Ok(LoadInput {
            ttl: required(ttl, "ttl", span)?,
            repetitions: required(repetitions, "repetitions", span)?,
        })
    }
}

impl Parse for HistogramInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let content = block(input)?;

        let mut shards = None;
        let mut reservoir = None;

        parse_fields(&content, |key, content| match key.to_string().as_str() {
            "shards" => set(&mut shards, key, content.parse::<Expr>()?),
            "reservoir" => set(&mut reservoir, key, content.parse::<ReservoirInput>()?),
            _ => Err(unknown(key)),
        })?;

        let span = content.span();

        Ok(HistogramInput {
            shards: required(shards, "shards", span)?,
            reservoir: required(reservoir, "reservoir", span)?,
        })
    }
}

impl Parse for ReservoirInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let reservoir_type = input.parse::<Ident>()?;
        let content = block(input)?;

        let mut size = None;

        parse_fields(&content, |key, content| match key.to_string().as_str() {
            "size" => set(&mut size, key, content.parse::<Expr>()?),
            _ => Err(unknown(key)),
        })?;

        let size = required(size, "size", content.span())?;

        match reservoir_type.to_string().as_str() {
            "Uniform" => Ok(ReservoirInput::Uniform { size }),
            "SlidingWindow" => Ok(ReservoirInput::SlidingWindow { size }),
            _ => Err(Error::new(
                reservoir_type.span(),
                format!("reservoir '{reservoir_type}' is not supported"),
            )),
        }
    }
}

impl Parse for ReportInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let content = block(input)?;

        let mut interval = None;

        parse_fields(&content, |key, content| match key.to_string().as_str() {
            "interval" => set(&mut interval, key, content.parse::<Expr>()?),
            _ => Err(unknown(key)),
        })?;

        Ok(ReportInput {
            interval: required(interval, "interval", content.span())?,
        })
    }
}
