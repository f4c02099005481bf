use tokio::sync::mpsc::UnboundedSender;

#[macro_export]
macro_rules! ensure {
    ($cond:expr) => {
        if !($cond) {
            return None;
        }
    };
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err.into());
        }
    };
}

pub trait DispatchExt<T> {
    /// Sends a copy of `value` to every subscriber, dropping the ones that hung up.
    /// Returns whether at least one subscriber is still listening.
    fn dispatch(&mut self, value: T) -> bool;
}

impl<T: Clone> DispatchExt<T> for Vec<UnboundedSender<T>> {
    fn dispatch(&mut self, value: T) -> bool {
        let mut values = repeat_n(value, self.len());
        self.retain_mut(|tx| values
            .next()
            .map_or(false, |value| tx.send(value).is_ok()));
        !self.is_empty()
    }
}

pub fn repeat_n<T: Clone>(value: T, n: usize) -> RepeatN<T> {
    RepeatN { value: Some(value), n }
}

pub struct RepeatN<T> {
    value: Option<T>,
    n: usize,
}

impl<T: Clone> Iterator for RepeatN<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self.n {
            0 => None,
            1 => {
                self.n = 0;
                self.value.take()
            }
            _ => {
                self.n -= 1;
                self.value.clone()
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.n, Some(self.n))
    }
}

impl<T: Clone> ExactSizeIterator for RepeatN<T> {}
