//! Packets exchanged between nodes.
//!
//! A [`DataPacket`] is what a protocol hands to its radio: addressing plus a
//! frozen map of named field values. A [`RadioPacket`] is what actually goes
//! on the air: the data packet wrapped with its airtime and received signal
//! strength.

use std::collections::BTreeMap;
use std::fmt;

use crate::kernel::time::Duration;

/// Node identifier as used in packet addressing.
pub type Identifier = String;

/// Reserved destination identifier meaning "every node except the source".
pub const BROADCAST: &str = "All";

/// A single named value carried in a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> FieldValue {
        FieldValue::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> FieldValue {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> FieldValue {
        FieldValue::Text(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Text(value) => write!(f, "{value}"),
        }
    }
}

/// A packet containing data to be passed between nodes.
///
/// Logically immutable once constructed; equality is structural over source,
/// destination and contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    src: Identifier,
    dest: Identifier,
    contents: BTreeMap<String, FieldValue>,
}

impl DataPacket {
    /// Build a packet from precomputed field values.
    pub fn with_contents<I, K, V>(
        src: impl Into<Identifier>,
        dest: impl Into<Identifier>,
        contents: I,
    ) -> DataPacket
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        DataPacket {
            src: src.into(),
            dest: dest.into(),
            contents: contents
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }

    /// Build a packet from field producers.
    ///
    /// Each producer is invoked exactly once, in the order the fields are
    /// given, and the produced values are frozen into the packet. This lets
    /// a caller bind live state (counters, clocks) into a constructor and
    /// capture a snapshot per packet.
    pub fn from_fields<I, K, F>(
        src: impl Into<Identifier>,
        dest: impl Into<Identifier>,
        fields: I,
    ) -> DataPacket
    where
        I: IntoIterator<Item = (K, F)>,
        K: Into<String>,
        F: FnMut() -> FieldValue,
    {
        let mut contents = BTreeMap::new();
        for (name, mut produce) in fields {
            contents.insert(name.into(), produce());
        }
        DataPacket {
            src: src.into(),
            dest: dest.into(),
            contents,
        }
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn dest(&self) -> &str {
        &self.dest
    }

    /// Names of the fields carried in the packet.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.contents.keys().map(String::as_str)
    }

    /// The packet's frozen contents.
    pub fn data(&self) -> &BTreeMap<String, FieldValue> {
        &self.contents
    }
}

impl fmt::Display for DataPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link: {} -> {}, Contents: {{", self.src, self.dest)?;
        for (idx, (name, value)) in self.contents.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Packet which is exchanged between radios.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioPacket {
    data: DataPacket,
    duration: Duration,
    rssi: f32,
}

impl RadioPacket {
    pub fn new(data: DataPacket, duration: Duration, rssi: f32) -> RadioPacket {
        RadioPacket {
            data,
            duration,
            rssi,
        }
    }

    pub fn data(&self) -> &DataPacket {
        &self.data
    }

    pub fn into_data(self) -> DataPacket {
        self.data
    }

    /// On-air time of the packet.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Received signal strength indicator.
    pub fn rssi(&self) -> f32 {
        self.rssi
    }

    pub fn src(&self) -> &str {
        self.data.src()
    }

    pub fn dest(&self) -> &str {
        self.data.dest()
    }
}

impl fmt::Display for RadioPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataPacket: ({}), Duration: {}, RSSI: {}",
            self.data, self.duration, self.rssi
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn producers_run_once_at_construction_in_insertion_order() {
        let calls = Rc::new(Cell::new(0));
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));

        let fields = ["first", "second", "third"].map(|name| {
            let calls = Rc::clone(&calls);
            let order = Rc::clone(&order);
            (name, move || {
                calls.set(calls.get() + 1);
                order.borrow_mut().push(name);
                FieldValue::Int(calls.get())
            })
        });

        let packet = DataPacket::from_fields("A", "B", fields);
        assert_eq!(calls.get(), 3);
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
        assert_eq!(packet.data().get("first"), Some(&FieldValue::Int(1)));
        assert_eq!(packet.data().get("third"), Some(&FieldValue::Int(3)));
    }

    #[test]
    fn fields_and_contents_construction_agree() {
        let counter = Cell::new(41);
        let from_fields = DataPacket::from_fields(
            "A",
            "B",
            [("answer", || {
                counter.set(counter.get() + 1);
                FieldValue::Int(counter.get())
            })],
        );
        let with_contents = DataPacket::with_contents("A", "B", [("answer", FieldValue::Int(42))]);
        assert_eq!(from_fields, with_contents);
    }

    #[test]
    fn equality_is_structural() {
        let a = DataPacket::with_contents("A", "B", [("msg", "hi")]);
        let b = DataPacket::with_contents("A", "B", [("msg", "hi")]);
        let c = DataPacket::with_contents("A", "C", [("msg", "hi")]);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let airtime = Duration::from_units(5);
        assert_eq!(
            RadioPacket::new(a.clone(), airtime, 1.0),
            RadioPacket::new(b.clone(), airtime, 1.0)
        );
        assert_ne!(
            RadioPacket::new(a.clone(), airtime, 1.0),
            RadioPacket::new(b, airtime, 0.5)
        );
        assert_ne!(
            RadioPacket::new(a.clone(), airtime, 1.0),
            RadioPacket::new(a, Duration::from_units(6), 1.0)
        );
    }

    #[test]
    fn display_shows_the_link_and_contents() {
        let packet = DataPacket::with_contents("A", "All", [("msg", "hello")]);
        assert_eq!(packet.to_string(), "Link: A -> All, Contents: {msg: hello}");
    }
}
