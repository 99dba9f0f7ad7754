// reduce.rs — Collapse-until-fits consolidation of chunk summaries.
//
// Phases:
//   NeedsCollapse  --(pass, still over budget)-->  NeedsCollapse
//   NeedsCollapse  --(pass, fits)-------------->  ReadyToReduce
//   ReadyToReduce  --(one reduce call)--------->  Done
//
// Size is the token count of the fully rendered reduce prompt, so the budget
// accounts for the template as well as the summaries.

use std::ops::Range;

use anyhow::bail;

use super::prompts::SummaryPrompts;
use crate::config;
use crate::llm::{GenerationConfig, TextGenerator};

#[derive(Debug, Clone)]
pub struct ReduceSettings {
    /// Upper bound on reduce prompt tokens.
    pub token_max: usize,
    pub max_collapse_passes: usize,
}

impl Default for ReduceSettings {
    fn default() -> Self {
        Self {
            token_max: config::summarize::TOKEN_MAX,
            max_collapse_passes: config::summarize::MAX_COLLAPSE_PASSES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapsePass {
    pub docs_before: usize,
    pub groups: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReduceTrace {
    pub collapse_passes: Vec<CollapsePass>,
    pub final_prompt_tokens: usize,
}

enum ReducePhase {
    NeedsCollapse,
    ReadyToReduce,
    Done(String),
}

fn join_summaries(docs: &[String]) -> String {
    docs.join(config::summarize::SUMMARY_SEPARATOR)
}

fn reduce_prompt_tokens<G: TextGenerator + ?Sized>(
    generator: &G,
    prompts: &SummaryPrompts,
    docs: &[String],
) -> anyhow::Result<usize> {
    generator.count_tokens(&prompts.reduce(&join_summaries(docs)))
}

/// Greedy, order-preserving grouping: keep adding docs to the current group
/// until the next one would push its size over `token_max`.
///
/// A single doc that is over budget on its own cannot be placed and is an error.
pub fn plan_groups<F>(docs: &[String], token_max: usize, mut size_of: F) -> anyhow::Result<Vec<Range<usize>>>
where
    F: FnMut(&[String]) -> anyhow::Result<usize>,
{
    let mut groups = Vec::new();
    let mut start = 0;
    for end in 1..=docs.len() {
        if size_of(&docs[start..end])? <= token_max {
            continue;
        }
        if end - start == 1 {
            bail!(
                "summary {} alone exceeds the reduce budget of {} tokens",
                start + 1,
                token_max
            );
        }
        groups.push(start..end - 1);
        start = end - 1;
        // The doc that overflowed now opens a group by itself; it must fit alone.
        if size_of(&docs[start..end])? > token_max {
            bail!(
                "summary {} alone exceeds the reduce budget of {} tokens",
                start + 1,
                token_max
            );
        }
    }
    if start < docs.len() {
        groups.push(start..docs.len());
    }
    Ok(groups)
}

/// Consolidate `summaries` into one, collapsing first while they are over budget.
pub fn reduce_summaries<G: TextGenerator + ?Sized>(
    generator: &mut G,
    prompts: &SummaryPrompts,
    summaries: Vec<String>,
    settings: &ReduceSettings,
    gen_config: &GenerationConfig,
) -> anyhow::Result<(String, ReduceTrace)> {
    if summaries.is_empty() {
        bail!("nothing to reduce");
    }

    let mut trace = ReduceTrace::default();
    let mut docs = summaries;
    let mut size = reduce_prompt_tokens(&*generator, prompts, &docs)?;
    let mut phase = if size > settings.token_max {
        ReducePhase::NeedsCollapse
    } else {
        ReducePhase::ReadyToReduce
    };

    loop {
        phase = match phase {
            ReducePhase::NeedsCollapse => {
                if trace.collapse_passes.len() >= settings.max_collapse_passes {
                    bail!(
                        "summaries still need {} tokens after {} collapse passes (budget {})",
                        size,
                        trace.collapse_passes.len(),
                        settings.token_max
                    );
                }

                let groups = plan_groups(&docs, settings.token_max, |group| {
                    reduce_prompt_tokens(&*generator, prompts, group)
                })?;
                log::info!(
                    "Collapse pass {}: {} summaries ({} tokens) into {} groups",
                    trace.collapse_passes.len() + 1,
                    docs.len(),
                    size,
                    groups.len()
                );

                let mut collapsed = Vec::with_capacity(groups.len());
                for range in groups {
                    let prompt = prompts.reduce(&join_summaries(&docs[range]));
                    collapsed.push(generator.generate(&prompt, gen_config)?);
                }

                let after = reduce_prompt_tokens(&*generator, prompts, &collapsed)?;
                trace.collapse_passes.push(CollapsePass {
                    docs_before: docs.len(),
                    groups: collapsed.len(),
                    tokens_before: size,
                    tokens_after: after,
                });
                docs = collapsed;
                size = after;

                if size > settings.token_max {
                    ReducePhase::NeedsCollapse
                } else {
                    ReducePhase::ReadyToReduce
                }
            }
            ReducePhase::ReadyToReduce => {
                log::info!("Final reduce over {} summaries ({} tokens)", docs.len(), size);
                trace.final_prompt_tokens = size;
                let prompt = prompts.reduce(&join_summaries(&docs));
                ReducePhase::Done(generator.generate(&prompt, gen_config)?)
            }
            ReducePhase::Done(output) => return Ok((output, trace)),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarize::testing::{words, ScriptedGenerator};

    fn prompts() -> SummaryPrompts {
        SummaryPrompts::new("book", "the plot")
    }

    fn settings(token_max: usize) -> ReduceSettings {
        ReduceSettings { token_max, max_collapse_passes: 4 }
    }

    fn len_sum(docs: &[String]) -> anyhow::Result<usize> {
        Ok(docs.iter().map(String::len).sum())
    }

    fn synthetic(sizes: &[usize]) -> Vec<String> {
        sizes.iter().map(|&n| "x".repeat(n)).collect()
    }

    #[test]
    fn test_plan_groups_greedy_fill() {
        let docs = synthetic(&[4, 4, 4, 9, 1, 1]);
        let groups = plan_groups(&docs, 10, len_sum).unwrap();
        assert_eq!(groups, vec![0..2, 2..3, 3..5, 5..6]);
    }

    #[test]
    fn test_plan_groups_everything_fits() {
        let docs = synthetic(&[1, 2, 3]);
        assert_eq!(plan_groups(&docs, 10, len_sum).unwrap(), vec![0..3]);
    }

    #[test]
    fn test_plan_groups_rejects_oversized_doc() {
        let first = plan_groups(&synthetic(&[11, 1]), 10, len_sum).unwrap_err();
        assert!(first.to_string().contains("summary 1 alone"));
        let later = plan_groups(&synthetic(&[2, 3, 12]), 10, len_sum).unwrap_err();
        assert!(later.to_string().contains("summary 3 alone"));
    }

    #[test]
    fn test_plan_groups_every_group_fits() {
        let docs = synthetic(&[3, 7, 2, 2, 2, 8, 1, 5, 5, 9, 10]);
        let groups = plan_groups(&docs, 10, len_sum).unwrap();
        let mut next = 0;
        for g in &groups {
            assert_eq!(g.start, next);
            assert!(len_sum(&docs[g.clone()]).unwrap() <= 10);
            next = g.end;
        }
        assert_eq!(next, docs.len());
    }

    #[test]
    fn test_fits_means_single_reduce_call() {
        let mut g = ScriptedGenerator::fixed("final answer");
        let (out, trace) =
            reduce_summaries(&mut g, &prompts(), vec![words(5), words(5), words(5)], &settings(100), &GenerationConfig::default())
                .unwrap();
        assert_eq!(out, "final answer");
        assert_eq!(g.prompts.len(), 1);
        assert!(trace.collapse_passes.is_empty());
        assert!(trace.final_prompt_tokens <= 100);
    }

    #[test]
    fn test_collapse_until_under_budget_before_final_reduce() {
        // Each collapse output is short, so one pass brings six 30-word summaries under 100 tokens.
        let mut g = ScriptedGenerator::fixed("one two three four five");
        let summaries: Vec<String> = (0..6).map(|_| words(30)).collect();
        let (_, trace) =
            reduce_summaries(&mut g, &prompts(), summaries, &settings(100), &GenerationConfig::default()).unwrap();

        assert_eq!(trace.collapse_passes.len(), 1);
        let pass = &trace.collapse_passes[0];
        assert!(pass.tokens_before > 100);
        assert!(pass.tokens_after <= 100);
        assert!(pass.groups < pass.docs_before);
        assert_eq!(trace.final_prompt_tokens, pass.tokens_after);

        // Every collapse prompt and the final prompt respected the budget.
        for p in &g.prompts {
            assert!(p.split_whitespace().count() <= 100);
        }
        assert_eq!(g.prompts.len(), pass.groups + 1);
    }

    #[test]
    fn test_multiple_collapse_passes() {
        // Outputs shrink slowly: each 2-doc group collapses to 20 words.
        let mut g = ScriptedGenerator::fixed(&words(20));
        let summaries: Vec<String> = (0..16).map(|_| words(30)).collect();
        let (_, trace) =
            reduce_summaries(&mut g, &prompts(), summaries, &settings(100), &GenerationConfig::default()).unwrap();
        assert!(trace.collapse_passes.len() >= 2);
        for pair in trace.collapse_passes.windows(2) {
            assert!(pair[1].tokens_before == pair[0].tokens_after);
        }
        assert!(trace.collapse_passes.last().unwrap().tokens_after <= 100);
    }

    #[test]
    fn test_no_progress_hits_pass_cap() {
        // Collapse output as large as its input never shrinks the set.
        let mut g = ScriptedGenerator::fixed(&words(40));
        let summaries: Vec<String> = (0..4).map(|_| words(40)).collect();
        let err = reduce_summaries(&mut g, &prompts(), summaries, &settings(100), &GenerationConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("collapse passes"));
    }

    #[test]
    fn test_generation_failure_is_fatal() {
        let mut g = ScriptedGenerator::failing_after(0);
        let err = reduce_summaries(&mut g, &prompts(), vec![words(3)], &settings(100), &GenerationConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("out of memory"));
    }

    #[test]
    fn test_empty_input_rejected() {
        let mut g = ScriptedGenerator::fixed("x");
        assert!(reduce_summaries(&mut g, &prompts(), Vec::new(), &settings(100), &GenerationConfig::default()).is_err());
    }
}
