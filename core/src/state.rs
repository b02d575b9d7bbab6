//! Observable value cells (analyzer status, maintenance flags).
//!
//! Subscribers run synchronously inside `set`, on every assignment,
//! including assignments of an unchanged value.

use crate::types::SimTime;

pub type Subscriber<T> = Box<dyn FnMut(SimTime, &T)>;

pub struct ObservableState<T> {
    name:        String,
    value:       T,
    subscribers: Vec<Subscriber<T>>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for ObservableState<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableState")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<T> ObservableState<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self { name: name.into(), value, subscribers: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, now: SimTime, value: T) {
        self.value = value;
        let current = &self.value;
        for subscriber in self.subscribers.iter_mut() {
            subscriber(now, current);
        }
    }

    pub fn subscribe(&mut self, subscriber: Subscriber<T>) {
        self.subscribers.push(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn every_set_notifies() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let mut flag = ObservableState::new("needs_waste", false);
        flag.subscribe(Box::new(move |t: SimTime, v: &bool| sink.borrow_mut().push((t, *v))));

        flag.set(1.0, true);
        flag.set(2.0, true);
        flag.set(3.0, false);
        assert_eq!(*log.borrow(), vec![(1.0, true), (2.0, true), (3.0, false)]);
        assert!(!*flag.get());
    }
}
