//! Interrupt handling and the event queue.
//!
//! The IP core raises a single interrupt line for all causes; the latched
//! causes are read from the interrupt status register and cleared by
//! writing them back. The [`InterruptHandler`] owns the UIO interrupt file
//! descriptor, decodes each interrupt into [`Event`]s and pushes them into
//! a bounded channel drained through the [`EventQueue`].

use crate::error::Result;
use crate::mmio::{Mapping, RegisterIo, Uio};
use crate::regs;
use tokio::sync::mpsc;

const EVENT_QUEUE_CAPACITY: usize = 64;

/// An asynchronous notification from the IP core.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Event {
    /// Overflow in the decimator.
    DecimatorOverflow,
    /// Overflow in the mixer.
    MixerOverflow,
    /// Overrun in the decimator.
    DecimatorOverrun,
    /// Overrun in the selector.
    SelectorOverrun,
    /// The hardware applied a committed configuration.
    ConfigUpdate,
    /// Carrier sequence error.
    SequenceError,
    /// Subframe schedule update.
    SubframeUpdate,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Event::DecimatorOverflow => "decimator overflow",
            Event::MixerOverflow => "mixer overflow",
            Event::DecimatorOverrun => "decimator overrun",
            Event::SelectorOverrun => "selector overrun",
            Event::ConfigUpdate => "configuration update applied",
            Event::SequenceError => "carrier sequence error",
            Event::SubframeUpdate => "subframe schedule update",
        };
        f.write_str(name)
    }
}

/// Decodes a latched interrupt status word into events, lowest cause bit
/// first.
pub fn events_from_status(word: u32) -> Vec<Event> {
    use crate::regs::irq as i;
    let causes = [
        (i::DECIMATOR_OVERFLOW_BIT, Event::DecimatorOverflow),
        (i::MIXER_OVERFLOW_BIT, Event::MixerOverflow),
        (i::DECIMATOR_OVERRUN_BIT, Event::DecimatorOverrun),
        (i::SELECTOR_OVERRUN_BIT, Event::SelectorOverrun),
        (i::CONFIG_UPDATE_BIT, Event::ConfigUpdate),
        (i::SEQUENCE_ERROR_BIT, Event::SequenceError),
        (i::SUBFRAME_UPDATE_BIT, Event::SubframeUpdate),
    ];
    causes
        .into_iter()
        .filter_map(|(bit, event)| (word & bit != 0).then_some(event))
        .collect()
}

/// Services the IP core interrupt.
///
/// [`InterruptHandler::run`] must be driven concurrently (typically in a
/// spawned task) for events to reach the queue.
#[derive(Debug)]
pub struct InterruptHandler {
    uio: Uio,
    registers: Mapping,
    tx: mpsc::Sender<Event>,
}

/// Receiving end of the interrupt event channel.
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::Receiver<Event>,
}

impl InterruptHandler {
    /// Creates an interrupt handler and its event queue.
    ///
    /// The handler takes ownership of the UIO device, since the interrupt
    /// acknowledge protocol needs exclusive use of the file descriptor.
    pub fn new(uio: Uio, registers: Mapping) -> (InterruptHandler, EventQueue) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        (InterruptHandler { uio, registers, tx }, EventQueue { rx })
    }

    /// Runs the interrupt service loop.
    ///
    /// Returns `Ok(())` when the event queue has been dropped; a transport
    /// or UIO error aborts the loop.
    pub async fn run(mut self) -> Result<()> {
        loop {
            self.uio.irq_enable().await?;
            self.uio.irq_wait().await?;
            let status = self.registers.read_reg(regs::irq::STATUS)?;
            // write-1-clear of exactly the causes we are reporting
            self.registers.write_reg(regs::irq::STATUS, status)?;
            for event in events_from_status(status) {
                tracing::debug!("interrupt event: {event}");
                if self.tx.send(event).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

impl EventQueue {
    /// Receives the next event. Returns `None` when the interrupt handler
    /// has stopped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::regs::irq;

    #[test]
    fn status_word_decode() {
        assert!(events_from_status(0).is_empty());
        assert_eq!(
            events_from_status(irq::CONFIG_UPDATE_BIT),
            vec![Event::ConfigUpdate]
        );
        assert_eq!(
            events_from_status(
                irq::MIXER_OVERFLOW_BIT | irq::SEQUENCE_ERROR_BIT | irq::DECIMATOR_OVERFLOW_BIT
            ),
            vec![
                Event::DecimatorOverflow,
                Event::MixerOverflow,
                Event::SequenceError
            ]
        );
    }

    #[test]
    fn all_cause_bits_decode() {
        let word = irq::DECIMATOR_OVERFLOW_BIT
            | irq::MIXER_OVERFLOW_BIT
            | irq::DECIMATOR_OVERRUN_BIT
            | irq::SELECTOR_OVERRUN_BIT
            | irq::CONFIG_UPDATE_BIT
            | irq::SEQUENCE_ERROR_BIT
            | irq::SUBFRAME_UPDATE_BIT;
        assert_eq!(events_from_status(word).len(), 7);
    }
}
