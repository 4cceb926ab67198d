use crate::error::{Error, Result};
use crate::inference::Record;
use crate::query::Query;
use crate::response::Response;
use super::merge::merge_ranked;

/// How many consecutive instances one query occupies in submission order.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySpan {
    Completion,
    Ranked { candidates: Vec<String> },
}

impl QuerySpan {
    pub(crate) fn of<P>(query: &Query<P>) -> Self {
        match query {
            Query::Completion(_) => QuerySpan::Completion,
            Query::Ranked(query) => QuerySpan::Ranked {
                candidates: query.candidates().to_vec(),
            },
        }
    }

    pub fn width(&self) -> usize {
        match self {
            QuerySpan::Completion => 1,
            QuerySpan::Ranked { candidates } => candidates.len(),
        }
    }
}

/// The bookkeeping needed to map batched outputs back onto the submitted queries.
///
/// `order[k]` is the submission index of the `k`th instance emitted across all batches.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingPlan {
    order: Vec<usize>,
    spans: Vec<QuerySpan>,
}

impl SchedulingPlan {
    pub(crate) fn new(order: Vec<usize>, spans: Vec<QuerySpan>) -> Self {
        Self { order, spans }
    }

    /// A plan whose batches emit instances in submission order.
    pub(crate) fn identity(spans: Vec<QuerySpan>) -> Self {
        let count = spans.iter().map(QuerySpan::width).sum();
        Self::new((0..count).collect(), spans)
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn spans(&self) -> &[QuerySpan] {
        &self.spans
    }

    pub fn instance_count(&self) -> usize {
        self.order.len()
    }

    pub fn query_count(&self) -> usize {
        self.spans.len()
    }

    pub fn is_identity(&self) -> bool {
        self.order.iter().enumerate().all(|(k, &index)| k == index)
    }

    /// Put outputs produced in batch order back into submission order.
    pub fn restore<R>(&self, outputs: Vec<R>) -> Result<Vec<R>> {
        if outputs.len() != self.order.len() {
            return Err(Error::ReorderLengthMismatch {
                expected: self.order.len(),
                actual: outputs.len(),
            });
        }

        let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(outputs.len()).collect();
        for (&index, output) in self.order.iter().zip(outputs) {
            slots[index] = Some(output);
        }
        Ok(slots.into_iter().flatten().collect())
    }

    /// Restore submission order, then fold each ranked query's records into one response.
    pub fn reorder(&self, records: Vec<Record>) -> Result<Vec<Response>> {
        let mut records = self.restore(records)?.into_iter().enumerate();
        let mut next = || {
            records.next().ok_or(Error::ReorderLengthMismatch {
                expected: self.order.len(),
                actual: self.order.len(),
            })
        };

        let mut responses = Vec::with_capacity(self.spans.len());
        for span in &self.spans {
            match span {
                QuerySpan::Completion => {
                    let (index, record) = next()?;
                    let response = match record {
                        Record::Completion(completion) => Response::Completion(completion),
                        Record::Embedding(embedding) => Response::Embedding(embedding),
                        Record::Score(_) => return Err(Error::RecordMismatch {
                            index,
                            expected: "completion",
                            found: "score",
                        }),
                    };
                    responses.push(response);
                }
                QuerySpan::Ranked { candidates } => {
                    let mut group = Vec::with_capacity(candidates.len());
                    for _ in candidates {
                        match next()? {
                            (_, Record::Score(score)) => group.push(score),
                            (index, other) => return Err(Error::RecordMismatch {
                                index,
                                expected: "score",
                                found: other.kind(),
                            }),
                        }
                    }
                    responses.push(Response::Ranked(merge_ranked(candidates, group)));
                }
            }
        }
        Ok(responses)
    }
}
