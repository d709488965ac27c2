use crate::input::{
    GridInput, HistogramInput, LoadInput, ProbeInput, ReportInput, ReservoirInput, SweepInput,
};
use proc_macro::TokenStream;
use quote::{ToTokens, quote};
use syn::parse_macro_input;

mod input;
mod parse;

/// Builds a `ttl_probe::ProbeConfig` from a declarative block.
///
/// Every field is required. Duplicate, missing and unknown fields are
/// compile errors.
#[proc_macro]
pub fn probe(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as ProbeInput);

    let expanded = quote! {#input};

    TokenStream::from(expanded)
}

impl ToTokens for ProbeInput {
    fn to_tokens(&self, tokens: &mut proc_macro2::TokenStream) {
        let map = &self.map;
        let grid = &self.grid;
        let load = &self.load;
        let histogram = &self.histogram;
        let report = &self.report;

        tokens.extend(quote! {
            {
                let map_name = ::std::string::String::from(#map);
                ::ttl_probe::config::ProbeConfig {
                    reporter: ::ttl_probe::config::ReporterConfig {
                        interval: #report,
                        name: ::std::clone::Clone::clone(&map_name),
                    },
                    map_name,
                    grid: #grid,
                    load: #load,
                    histogram: #histogram,
                }
            }
        });
    }
}

impl ToTokens for GridInput {
    fn to_tokens(&self, tokens: &mut proc_macro2::TokenStream) {
        let partitions = &self.partitions;
        let operation_threads = &self.operation_threads;
        let event_threads = &self.event_threads;
        let SweepInput {
            interval,
            partitions: partitions_per_sweep,
        } = &self.sweep;

        tokens.extend(quote! {
            ::ttl_probe::config::GridConfig {
                partition_count: #partitions,
                operation_threads: #operation_threads,
                event_threads: #event_threads,
                sweep_interval: #interval,
                partitions_per_sweep: #partitions_per_sweep,
                ..::core::default::Default::default()
            }
        });
    }
}

impl ToTokens for LoadInput {
    fn to_tokens(&self, tokens: &mut proc_macro2::TokenStream) {
        let ttl = &self.ttl;
        let repetitions = &self.repetitions;

        tokens.extend(quote! {
            ::ttl_probe::config::LoadConfig {
                ttl_seconds: #ttl,
                repetitions: #repetitions,
            }
        });
    }
}

impl ToTokens for HistogramInput {
    fn to_tokens(&self, tokens: &mut proc_macro2::TokenStream) {
        let shards = &self.shards;
        let reservoir = &self.reservoir;

        tokens.extend(quote! {
            ::ttl_probe::config::HistogramConfig::new(#shards, #reservoir)
        });
    }
}

impl ToTokens for ReservoirInput {
    fn to_tokens(&self, tokens: &mut proc_macro2::TokenStream) {
        match self {
            ReservoirInput::Uniform { size } => tokens.extend(quote! {
                ::ttl_probe::reservoir::ReservoirConfig::Uniform { size: #size }
            }),
            ReservoirInput::SlidingWindow { size } => tokens.extend(quote! {
                ::ttl_probe::reservoir::ReservoirConfig::SlidingWindow { size: #size }
            }),
        }
    }
}

impl ToTokens for ReportInput {
    fn to_tokens(&self, tokens: &mut proc_macro2::TokenStream) {
        let interval = &self.interval;

        tokens.extend(quote! {#interval});
    }
}
