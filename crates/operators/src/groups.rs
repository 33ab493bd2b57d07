//! Grouping operators that route elements through ad-hoc sub-pipes.
//!
//! Every sub-pipe is attached in front of one shared downstream. Closing a
//! sub-pipe flushes only its own stages; the grouping stage closes the
//! shared downstream once, on its own close.

use std::collections::BTreeMap;
use std::rc::Rc;

use contracts::{BoxTarget, Flow, PipeResult, Target, Value};
use pipe_core::{attach, Pipe, SharedTarget};
use tracing::trace;

/// Key extracted from an element
pub type KeyFn = Rc<dyn Fn(&Value) -> PipeResult<Value>>;

/// Sub-pipe built for a key
pub type KeyPipeFn = Rc<dyn Fn(&Value) -> PipeResult<Pipe>>;

/// Sub-pipe built for a joined `(key, value)` entry
pub type JoinPipeFn = Rc<dyn Fn(&Value, &Value) -> PipeResult<Pipe>>;

/// Push into a live sub-target; retire it if it finished
fn feed_sub(slot: &mut Option<BoxTarget>, value: Value) -> PipeResult<()> {
    if let Some(target) = slot {
        if target.push(value)?.is_done() {
            trace!("sub-pipe finished early");
            *slot = None;
        }
    }
    Ok(())
}

fn close_sub(slot: &mut Option<BoxTarget>) -> PipeResult<()> {
    match slot.take() {
        Some(mut target) => target.close(),
        None => Ok(()),
    }
}

fn flow_of(downstream: &SharedTarget) -> Flow {
    if downstream.is_finished() {
        Flow::Done
    } else {
        Flow::Continue
    }
}

/// Sub-targets keyed by value, kept in first-seen order
#[derive(Default)]
struct KeyedSubs {
    order: Vec<Option<BoxTarget>>,
    index: BTreeMap<Value, usize>,
}

impl KeyedSubs {
    fn slot_for(
        &mut self,
        key: Value,
        make: impl FnOnce(&Value) -> PipeResult<Option<BoxTarget>>,
    ) -> PipeResult<&mut Option<BoxTarget>> {
        let at = match self.index.get(&key) {
            Some(&at) => at,
            None => {
                let target = make(&key)?;
                self.order.push(target);
                self.index.insert(key, self.order.len() - 1);
                self.order.len() - 1
            }
        };
        Ok(&mut self.order[at])
    }

    fn contains(&self, key: &Value) -> bool {
        self.index.contains_key(key)
    }

    fn close_all(&mut self) -> PipeResult<()> {
        for slot in &mut self.order {
            close_sub(slot)?;
        }
        Ok(())
    }
}

// ===== consec_group =====

struct ConsecGroup {
    key: KeyFn,
    key_pipe: KeyPipeFn,
    current: Option<(Value, Option<BoxTarget>)>,
    downstream: SharedTarget,
}

impl Target for ConsecGroup {
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        if self.downstream.is_finished() {
            return Ok(Flow::Done);
        }
        let k = (self.key)(&value)?;
        let same = matches!(&self.current, Some((cur, _)) if *cur == k);
        if !same {
            if let Some((_, mut previous)) = self.current.take() {
                close_sub(&mut previous)?;
            }
            let pipe = (self.key_pipe)(&k)?;
            let target = attach(&pipe, &self.downstream)?;
            self.current = Some((k, target));
        }
        if let Some((_, slot)) = &mut self.current {
            feed_sub(slot, value)?;
        }
        Ok(flow_of(&self.downstream))
    }

    fn close(&mut self) -> PipeResult<()> {
        if let Some((_, mut last)) = self.current.take() {
            close_sub(&mut last)?;
        }
        self.downstream.close()
    }
}

/// Route each run of consecutive equal keys through a fresh sub-pipe
///
/// The previous sub-pipe is closed as soon as the key changes.
///
/// ```
/// use contracts::Value;
/// use operators::{consec_group, constant, count, source, split, to_list};
///
/// let pairs = vec![Value::pair(1, 1), Value::pair(1, 455), Value::pair(13, 0)];
/// let out = source(pairs)
///     .then(consec_group(
///         |p: &Value| Ok(p.get(0).cloned().unwrap_or(Value::Null)),
///         |k: &Value| split(vec![constant(k.clone()), count()]),
///     ))
///     .unwrap()
///     .run(to_list())
///     .unwrap();
/// assert_eq!(out.to_string(), "[(1, 2), (13, 1)]");
/// ```
pub fn consec_group<K, P>(key: K, key_pipe: P) -> Pipe
where
    K: Fn(&Value) -> PipeResult<Value> + 'static,
    P: Fn(&Value) -> PipeResult<Pipe> + 'static,
{
    let key: KeyFn = Rc::new(key);
    let key_pipe: KeyPipeFn = Rc::new(key_pipe);
    Pipe::middle("consec_group", move |downstream| {
        Box::new(ConsecGroup {
            key: Rc::clone(&key),
            key_pipe: Rc::clone(&key_pipe),
            current: None,
            downstream: SharedTarget::new(downstream),
        })
    })
}

// ===== group =====

struct Group {
    key: KeyFn,
    key_pipe: KeyPipeFn,
    subs: KeyedSubs,
    downstream: SharedTarget,
}

impl Target for Group {
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        if self.downstream.is_finished() {
            return Ok(Flow::Done);
        }
        let k = (self.key)(&value)?;
        let (key_pipe, downstream) = (&self.key_pipe, &self.downstream);
        let slot = self
            .subs
            .slot_for(k, |k| attach(&key_pipe(k)?, downstream))?;
        feed_sub(slot, value)?;
        Ok(flow_of(&self.downstream))
    }

    fn close(&mut self) -> PipeResult<()> {
        self.subs.close_all()?;
        self.downstream.close()
    }
}

/// One sub-pipe per distinct key, flushed in first-seen key order on close
pub fn group<K, P>(key: K, key_pipe: P) -> Pipe
where
    K: Fn(&Value) -> PipeResult<Value> + 'static,
    P: Fn(&Value) -> PipeResult<Pipe> + 'static,
{
    let key: KeyFn = Rc::new(key);
    let key_pipe: KeyPipeFn = Rc::new(key_pipe);
    Pipe::middle("group", move |downstream| {
        Box::new(Group {
            key: Rc::clone(&key),
            key_pipe: Rc::clone(&key_pipe),
            subs: KeyedSubs::default(),
            downstream: SharedTarget::new(downstream),
        })
    })
}

// ===== chain =====

struct Chain {
    key_pipe: KeyPipeFn,
    downstream: SharedTarget,
}

impl Target for Chain {
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        if self.downstream.is_finished() {
            return Ok(Flow::Done);
        }
        let pipe = (self.key_pipe)(&value)?;
        let mut sub = attach(&pipe, &self.downstream)?;
        feed_sub(&mut sub, value)?;
        close_sub(&mut sub)?;
        Ok(flow_of(&self.downstream))
    }

    fn close(&mut self) -> PipeResult<()> {
        self.downstream.close()
    }
}

/// Splice in the output of a pipe built per element
///
/// A source pipe is replayed in place of the element; any other pipe
/// receives the element alone and is closed right after.
pub fn chain<P>(key_pipe: P) -> Pipe
where
    P: Fn(&Value) -> PipeResult<Pipe> + 'static,
{
    let key_pipe: KeyPipeFn = Rc::new(key_pipe);
    Pipe::middle("chain", move |downstream| {
        Box::new(Chain {
            key_pipe: Rc::clone(&key_pipe),
            downstream: SharedTarget::new(downstream),
        })
    })
}

// ===== dict_join =====

/// Parameters of [`dict_join`]
#[derive(Clone)]
pub struct DictJoin {
    pub joined: Rc<BTreeMap<Value, Value>>,
    pub key: KeyFn,
    pub common_pipe: JoinPipeFn,
    pub out_of_dict_pipe: Option<Pipe>,
    pub dict_only_pipe: Option<Pipe>,
}

impl DictJoin {
    pub fn new<K, P>(joined: BTreeMap<Value, Value>, key: K, common_pipe: P) -> Self
    where
        K: Fn(&Value) -> PipeResult<Value> + 'static,
        P: Fn(&Value, &Value) -> PipeResult<Pipe> + 'static,
    {
        Self {
            joined: Rc::new(joined),
            key: Rc::new(key),
            common_pipe: Rc::new(common_pipe),
            out_of_dict_pipe: None,
            dict_only_pipe: None,
        }
    }

    /// Pipe for elements whose key is missing from the dictionary
    pub fn out_of_dict(mut self, pipe: Pipe) -> Self {
        self.out_of_dict_pipe = Some(pipe);
        self
    }

    /// Pipe receiving `(key, value)` for entries no element matched
    pub fn dict_only(mut self, pipe: Pipe) -> Self {
        self.dict_only_pipe = Some(pipe);
        self
    }
}

struct DictJoinTarget {
    spec: DictJoin,
    started: bool,
    out_of_dict: Option<BoxTarget>,
    dict_only: Option<BoxTarget>,
    subs: KeyedSubs,
    downstream: SharedTarget,
}

impl DictJoinTarget {
    fn start(&mut self) -> PipeResult<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        if let Some(pipe) = &self.spec.out_of_dict_pipe {
            self.out_of_dict = attach(pipe, &self.downstream)?;
        }
        if let Some(pipe) = &self.spec.dict_only_pipe {
            self.dict_only = attach(pipe, &self.downstream)?;
        }
        Ok(())
    }
}

impl Target for DictJoinTarget {
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        if self.downstream.is_finished() {
            return Ok(Flow::Done);
        }
        self.start()?;
        let k = (self.spec.key)(&value)?;
        match self.spec.joined.get(&k) {
            None => feed_sub(&mut self.out_of_dict, value)?,
            Some(joined) => {
                let (common_pipe, downstream) = (&self.spec.common_pipe, &self.downstream);
                let slot = self
                    .subs
                    .slot_for(k, |k| attach(&common_pipe(k, joined)?, downstream))?;
                feed_sub(slot, value)?;
            }
        }
        Ok(flow_of(&self.downstream))
    }

    fn close(&mut self) -> PipeResult<()> {
        self.start()?;
        self.subs.close_all()?;
        close_sub(&mut self.out_of_dict)?;
        if self.dict_only.is_some() {
            let joined = Rc::clone(&self.spec.joined);
            for (k, v) in joined.iter().filter(|(k, _)| !self.subs.contains(k)) {
                feed_sub(&mut self.dict_only, Value::pair(k.clone(), v.clone()))?;
            }
            close_sub(&mut self.dict_only)?;
        }
        self.downstream.close()
    }
}

/// SQL-style join of the stream against an in-memory dictionary
///
/// Elements whose key is present go through `common_pipe(key, joined[key])`,
/// one sub-pipe per key. On close, sub-pipes flush in first-seen order, then
/// the out-of-dictionary pipe, then unmatched entries go through the
/// dictionary-only pipe in key order.
pub fn dict_join(spec: DictJoin) -> Pipe {
    Pipe::middle("dict_join", move |downstream| {
        Box::new(DictJoinTarget {
            spec: spec.clone(),
            started: false,
            out_of_dict: None,
            dict_only: None,
            subs: KeyedSubs::default(),
            downstream: SharedTarget::new(downstream),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constant, count, map, nth, source, split, sum, to_list, try_map};
    use contracts::PipeError;

    fn first(p: &Value) -> PipeResult<Value> {
        Ok(p.get(0).cloned().unwrap_or(Value::Null))
    }

    fn key_and_count(k: &Value) -> PipeResult<Pipe> {
        split(vec![constant(k.clone()), count()])
    }

    fn pairs(xs: &[(i64, i64)]) -> Vec<Value> {
        xs.iter().map(|&(a, b)| Value::pair(a, b)).collect()
    }

    #[test]
    fn test_consec_group_counts_runs() {
        let out = source(pairs(&[(1, 1), (1, 455), (13, 0), (1, 2)]))
            .then(consec_group(first, key_and_count))
            .unwrap()
            .run(to_list())
            .unwrap();
        assert_eq!(out.to_string(), "[(1, 2), (13, 1), (1, 1)]");
    }

    #[test]
    fn test_group_first_seen_order() {
        let out = source(pairs(&[(1, 1), (13, 0), (1, 455)]))
            .then(group(first, key_and_count))
            .unwrap()
            .run(to_list())
            .unwrap();
        assert_eq!(out.to_string(), "[(1, 2), (13, 1)]");
    }

    #[test]
    fn test_group_retires_finished_sub_pipe() {
        let out = source([1, 2, 1, 2, 1])
            .then(group(|v: &Value| Ok(v.clone()), |_k: &Value| Ok(nth(0))))
            .unwrap()
            .run(to_list())
            .unwrap();
        assert_eq!(out.to_string(), "[1, 2]");
    }

    #[test]
    fn test_chain_replays_sources() {
        let out = source([1, 2, 3])
            .then(chain(|v: &Value| Ok(source([v.clone(), v.clone()]))))
            .unwrap()
            .run(to_list())
            .unwrap();
        assert_eq!(out.to_string(), "[1, 1, 2, 2, 3, 3]");
    }

    #[test]
    fn test_chain_with_middle_sub_pipe() {
        let out = source([1, 2])
            .then(chain(|_v: &Value| {
                Ok(try_map(|x: Value| x.try_mul(&Value::Int(10))))
            }))
            .unwrap()
            .run(sum())
            .unwrap();
        assert_eq!(out, Value::Int(30));
    }

    #[test]
    fn test_downstream_done_finishes_group() {
        let out = source([1, 2, 3, 4])
            .then(group(|v: &Value| Ok(v.clone()), |_k: &Value| Ok(crate::relay())))
            .unwrap()
            .run(nth(1))
            .unwrap();
        assert_eq!(out, Value::Int(2));
    }

    #[test]
    fn test_key_error_propagates() {
        let err = source([1])
            .then(group(
                |_v: &Value| Err(PipeError::user("no key")),
                key_and_count,
            ))
            .unwrap()
            .run(to_list())
            .unwrap_err();
        assert!(err.to_string().contains("no key"), "got: {err}");
    }

    #[test]
    fn test_dict_join_manager_headcount() {
        let employees: Vec<Value> = [
            ("Harry", "Finance"),
            ("Sally", "Sales"),
            ("George", "Finance"),
            ("Harriet", "Sales"),
            ("Nelson", "Entertainment"),
        ]
        .iter()
        .map(|&(name, dept)| Value::pair(name, dept))
        .collect();
        let managers: BTreeMap<Value, Value> = [
            ("Finance", "George"),
            ("Sales", "Harriet"),
            ("Production", "Charles"),
        ]
        .iter()
        .map(|&(d, m)| (Value::from(d), Value::from(m)))
        .collect();

        let spec = DictJoin::new(
            managers,
            |e: &Value| Ok(e.get(1).cloned().unwrap_or(Value::Null)),
            |_dept: &Value, manager: &Value| split(vec![constant(manager.clone()), count()]),
        )
        .dict_only(map(|entry: Value| {
            Value::pair(entry.get(1).cloned().unwrap_or(Value::Null), 0)
        }));

        let out = source(employees)
            .then(dict_join(spec))
            .unwrap()
            .run(to_list())
            .unwrap();
        assert_eq!(
            out.to_string(),
            "[('George', 2), ('Harriet', 2), ('Charles', 0)]"
        );
    }

    #[test]
    fn test_dict_join_out_of_dict() {
        let joined: BTreeMap<Value, Value> =
            [(Value::Int(1), Value::from("one"))].into_iter().collect();
        let spec = DictJoin::new(
            joined,
            |e: &Value| Ok(e.clone()),
            |_k: &Value, v: &Value| {
                let v = v.clone();
                Ok(map(move |_e: Value| v.clone()))
            },
        )
        .out_of_dict(map(|_e: Value| Value::Null));

        let out = source([1, 2, 1])
            .then(dict_join(spec))
            .unwrap()
            .run(to_list())
            .unwrap();
        assert_eq!(out.to_string(), "['one', null, 'one']");
    }
}
