//! Processor stamp applied after every other handler.

use chrono::{DateTime, Local, Offset, TimeZone};
use lopdf::Object;

use crate::error::Result;
use crate::instruction::InstructionSet;
use crate::interpret::{Handler, InterpretOptions};
use crate::pdf::text::text_string;
use crate::pdf::DocumentHandle;

pub struct FinalizeHandler {
    processor: String,
    stamp_mod_date: bool,
}

impl FinalizeHandler {
    pub fn new(options: &InterpretOptions) -> Self {
        Self {
            processor: options.processor(),
            stamp_mod_date: options.stamp_mod_date,
        }
    }
}

impl Handler for FinalizeHandler {
    type Section = InstructionSet;

    fn name(&self) -> &'static str {
        "finalize"
    }

    fn section<'a>(&self, set: &'a InstructionSet) -> Option<&'a InstructionSet> {
        Some(set)
    }

    fn apply(&self, mut handle: DocumentHandle, _: &InstructionSet) -> Result<DocumentHandle> {
        let info = handle.info_mut()?;
        info.set("Processor", text_string(&self.processor));
        if self.stamp_mod_date {
            info.set(
                "ModDate",
                Object::string_literal(pdf_date(&Local::now())),
            );
        }
        log::debug!("Stamped processor '{}'", self.processor);
        Ok(handle)
    }
}

/// `D:YYYYMMDDHHmmSS+HH'mm'`
pub fn pdf_date<Tz: TimeZone>(time: &DateTime<Tz>) -> String {
    let offset = time.offset().fix().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let minutes = offset.abs() / 60;
    format!(
        "D:{}{}{:02}'{:02}'",
        time.naive_local().format("%Y%m%d%H%M%S"),
        sign,
        minutes / 60,
        minutes % 60
    )
}
