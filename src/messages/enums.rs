//! Wire enumerations and their symbol tables

use crate::codec::{GtEnum, SymbolTable};
use serde::{Deserialize, Serialize};

/// Declare a wire enum together with its one symbol table.
///
/// The serde name of every variant is its local name, which is what the
/// generic codec maps to and from the opaque symbol.
macro_rules! gt_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $symbol:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl GtEnum for $name {
            const TABLE: &'static SymbolTable = &SymbolTable::new(
                stringify!($name),
                &[$((stringify!($variant), $symbol)),+],
            );

            fn as_local(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }

            fn from_local(local: &str) -> Option<Self> {
                match local {
                    $(stringify!($variant) => Some($name::$variant),)+
                    _ => None,
                }
            }

            fn symbol(&self) -> &'static str {
                match self {
                    $($name::$variant => $symbol),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_local())
            }
        }
    };
}

gt_enum! {
    Unit {
        Unknown => "00000000",
        Unitless => "ec972387",
        W => "f459a9c3",
        Celcius => "ec14bd47",
        Fahrenheit => "7d8832f8",
        Gpm => "b4580361",
        WattHours => "d66f1622",
        AmpsRms => "a969ac7c",
        VoltsRms => "e5d7555c",
        Gallons => "8e123a26",
    }
}

gt_enum! {
    TelemetryName {
        Unknown => "00000000",
        PowerW => "af39eec9",
        RelayState => "5a71d4b3",
        WaterFlowGpmTimes100 => "d70cce28",
        WaterTempCTimes1000 => "c89d0ba1",
        WaterTempFTimes1000 => "793505aa",
        GpmTimes100 => "d5d6fdee",
        CurrentRmsMicroAmps => "ad19e79c",
        GallonsTimes100 => "329a68c0",
        VoltageRmsMilliVolts => "15f94c65",
    }
}

gt_enum! {
    /// Role of an actor in the heating system
    ActorClass {
        None => "99a5f20d",
        Scada => "6d37aa41",
        BooleanActuator => "fddd0064",
        PowerMeter => "2ea112b9",
        Atn => "b103058f",
        SimpleSensor => "dae4b2f0",
    }
}

gt_enum! {
    MakeModel {
        Unknown => "00000000",
        GridworksSimPm1 => "076da322",
        SchneiderelectricIem3455 => "d300635e",
        NcdPr814spst => "c6e736d8",
        GridworksSimBool30amprelay => "1a7d6e2c",
    }
}

gt_enum! {
    LocalCommInterface {
        Unknown => "00000000",
        I2c => "9ec8bc49",
        Ethernet => "c1f6ff6b",
        Rs485 => "a6a4ac9f",
        Wifi => "46ac6589",
        SimRabbit => "efc144cd",
    }
}

gt_enum! {
    ProblemType {
        Notice => "5f4c3b2a",
        Warning => "9b8a3c0f",
        Error => "3fea1de8",
    }
}
