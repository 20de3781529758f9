#![forbid(unsafe_code)]

//! Verification of many documents on a pool of worker threads.
//!
//! Workers share one [`DsigContext`] and take documents from a common
//! counter. Results are returned in input order.

use crate::context::DsigContext;
use crate::verify::{verify_with_report, VerifyReport};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stenhamra_core::Error;

/// A document to verify.
#[derive(Debug, Clone)]
pub struct BatchInput {
    /// Label carried through to the result (usually a file name).
    pub name: String,
    pub xml: String,
}

/// Batch settings.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Worker threads; `0` picks the available parallelism.
    pub jobs: usize,
    /// Once set, documents not yet started are skipped.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// What happened to one document.
#[derive(Debug)]
pub enum BatchOutcome {
    Verified(VerifyReport),
    /// Verification stopped with an error.
    Failed(Error),
    /// Not started because the batch was cancelled.
    Skipped,
}

/// Result for one input, at the same index as the input.
#[derive(Debug)]
pub struct BatchEntry {
    pub name: String,
    pub outcome: BatchOutcome,
}

impl BatchEntry {
    pub fn is_valid(&self) -> bool {
        matches!(&self.outcome, BatchOutcome::Verified(r) if r.result.is_valid())
    }
}

/// Verify every input, continuing past per-document errors.
pub fn verify_batch(ctx: &DsigContext, inputs: &[BatchInput], options: &BatchOptions) -> Vec<BatchEntry> {
    let jobs = match options.jobs {
        0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
        n => n,
    }
    .min(inputs.len().max(1));

    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<BatchOutcome>>> =
        Mutex::new(inputs.iter().map(|_| None).collect());
    let cancelled = || {
        options
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    };

    log::debug!("verifying {} documents with {jobs} workers", inputs.len());
    std::thread::scope(|scope| {
        for _ in 0..jobs {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                let Some(input) = inputs.get(index) else {
                    break;
                };
                let outcome = if cancelled() {
                    BatchOutcome::Skipped
                } else {
                    match verify_with_report(ctx, &input.xml) {
                        Ok(report) => BatchOutcome::Verified(report),
                        Err(e) => {
                            log::debug!("{}: {e}", input.name);
                            BatchOutcome::Failed(e)
                        }
                    }
                };
                if let Ok(mut slots) = slots.lock() {
                    slots[index] = Some(outcome);
                }
            });
        }
    });

    let slots = slots.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    inputs
        .iter()
        .zip(slots)
        .map(|(input, outcome)| BatchEntry {
            name: input.name.clone(),
            outcome: outcome.unwrap_or(BatchOutcome::Skipped),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::{IndeterminateReason, VerifyResult};

    fn unsigned(name: &str) -> BatchInput {
        BatchInput {
            name: name.into(),
            xml: r#"<r><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/></ds:SignedInfo></ds:Signature></r>"#.into(),
        }
    }

    #[test]
    fn test_order_and_failures() {
        let inputs = vec![
            unsigned("a"),
            BatchInput {
                name: "broken".into(),
                xml: "<not-closed>".into(),
            },
            BatchInput {
                name: "nosig".into(),
                xml: "<r/>".into(),
            },
            unsigned("d"),
        ];
        let ctx = DsigContext::new();
        let results = verify_batch(
            &ctx,
            &inputs,
            &BatchOptions {
                jobs: 3,
                cancel: None,
            },
        );
        let names: Vec<_> = results.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "broken", "nosig", "d"]);
        assert!(matches!(
            &results[0].outcome,
            BatchOutcome::Verified(r) if r.result == VerifyResult::Indeterminate(IndeterminateReason::NoKey)
        ));
        assert!(matches!(&results[1].outcome, BatchOutcome::Failed(Error::XmlParse(_))));
        assert!(matches!(
            &results[2].outcome,
            BatchOutcome::Failed(Error::SignatureNotFound(_))
        ));
        assert!(matches!(&results[3].outcome, BatchOutcome::Verified(_)));
        assert!(results.iter().all(|e| !e.is_valid()));
    }

    #[test]
    fn test_cancelled_batch_skips_everything() {
        let inputs = vec![unsigned("a"), unsigned("b")];
        let options = BatchOptions {
            jobs: 1,
            cancel: Some(Arc::new(AtomicBool::new(true))),
        };
        let results = verify_batch(&DsigContext::new(), &inputs, &options);
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|e| matches!(e.outcome, BatchOutcome::Skipped)));
    }

    #[test]
    fn test_empty_batch() {
        assert!(verify_batch(&DsigContext::new(), &[], &BatchOptions::default()).is_empty());
    }
}
