//! Compiled-in catalogue of known meter templates
//!
//! A meter is identified by the firmware version and the number of registers the
//! center reports for it. Adding support for a new meter means adding an entry to
//! [`TEMPLATES`]; resolution never changes.

use super::types::{
    DeviceTemplate, MeasurementKind::*, RegisterDescriptor as Reg, TemplateId, VOLUME_UNIT,
};
use crate::errors::RegistryError;

const ENERGY: Option<&str> = Some("Energy");
const POWER: Option<&str> = Some("Power");
const POWER_VS: Option<&str> = Some("Power (vendor specific)");
const VOLTS_VS: Option<&str> = Some("Volts (vendor specific)");
const AMPERE: Option<&str> = Some("Ampere");
const AMPERE_VS: Option<&str> = Some("Ampere (vendor specific)");
const SUPPLIER: Option<&str> = Some("Special supplier information");
const RESET_COUNTER: Option<&str> = Some("Reset counter");
const ERROR_FLAGS: Option<&str> = Some("Error flags (Device type specific)");

/// The center literally reports the string "None" for dimensionless registers.
const NO_UNIT: &str = "None";

const EMU_1_40_V4_15VAL: [Reg; 9] = [
    Reg::new(Voltage, 0, "V", VOLTS_VS, true),
    Reg::new(Current, 1, "A", AMPERE_VS, true),
    Reg::new(FormFactor, 2, NO_UNIT, SUPPLIER, true),
    Reg::new(ActivePower, 3, "W", POWER, true),
    Reg::new(Frequency, 4, "Hz", Some("Frequency"), true),
    Reg::new(ActiveEnergyImport, 5, "Wh", ENERGY, true),
    Reg::new(ActiveEnergyImportResettable, 6, "Wh", ENERGY, true),
    Reg::new(SerialNo, 7, NO_UNIT, None, false),
    Reg::new(ErrorFlags, 12, "Bin", ERROR_FLAGS, false),
];

const ALLROUNDER_V16_15VAL: [Reg; 15] = [
    Reg::new(ActiveEnergyTariff1, 0, "Wh", ENERGY, true),
    Reg::new(ActiveEnergyTariff2, 1, "Wh", ENERGY, true),
    Reg::new(ActivePowerPhase1, 2, "W", POWER_VS, true),
    Reg::new(ActivePowerPhase2, 3, "W", POWER_VS, true),
    Reg::new(ActivePowerPhase3, 4, "W", POWER_VS, true),
    Reg::new(ActivePowerAllPhases, 5, "W", POWER, true),
    Reg::new(VoltagePhase1, 6, "V", VOLTS_VS, true),
    Reg::new(VoltagePhase2, 7, "V", VOLTS_VS, true),
    Reg::new(VoltagePhase3, 8, "V", VOLTS_VS, true),
    Reg::new(CurrentPhase1, 9, "A", AMPERE_VS, true),
    Reg::new(CurrentPhase2, 10, "A", AMPERE_VS, true),
    Reg::new(CurrentPhase3, 11, "A", AMPERE_VS, true),
    Reg::new(CurrentAllPhases, 12, "A", AMPERE, true),
    Reg::new(PowerFailures, 13, NO_UNIT, RESET_COUNTER, true),
    Reg::new(ErrorFlags, 14, "Bin", ERROR_FLAGS, false),
];

const ALLROUNDER_V16_17VAL: [Reg; 17] = [
    Reg::new(ActiveEnergyTariff1, 0, "Wh", ENERGY, true),
    Reg::new(ActiveEnergyTariff2, 1, "Wh", ENERGY, true),
    Reg::new(ActivePowerPhase1, 2, "W", POWER_VS, true),
    Reg::new(ActivePowerPhase2, 3, "W", POWER_VS, true),
    Reg::new(ActivePowerPhase3, 4, "W", POWER_VS, true),
    Reg::new(ActivePowerAllPhases, 5, "W", POWER, true),
    Reg::new(VoltagePhase1, 6, "V", VOLTS_VS, true),
    Reg::new(VoltagePhase2, 7, "V", VOLTS_VS, true),
    Reg::new(VoltagePhase3, 8, "V", VOLTS_VS, true),
    Reg::new(CurrentPhase1, 9, "A", AMPERE_VS, true),
    Reg::new(CurrentPhase2, 10, "A", AMPERE_VS, true),
    Reg::new(CurrentPhase3, 11, "A", AMPERE_VS, true),
    Reg::new(CurrentAllPhases, 12, "A", AMPERE, true),
    Reg::new(Frequency, 13, NO_UNIT, SUPPLIER, true),
    Reg::new(PowerFailures, 14, NO_UNIT, RESET_COUNTER, true),
    Reg::new(CurrentTransformerFactor, 15, NO_UNIT, SUPPLIER, true),
    Reg::new(ErrorFlags, 16, "Bin", ERROR_FLAGS, false),
];

const PROFESSIONAL_V16_31VAL: [Reg; 31] = [
    Reg::new(ActiveEnergyImportTariff1, 0, "Wh", ENERGY, true),
    Reg::new(ActiveEnergyImportTariff2, 1, "Wh", ENERGY, true),
    Reg::new(ActiveEnergyExportTariff1, 2, "Wh", ENERGY, true),
    Reg::new(ActiveEnergyExportTariff2, 3, "Wh", ENERGY, true),
    Reg::new(ReactiveEnergyInductiveTariff1, 4, "Wh", ENERGY, true),
    Reg::new(ReactiveEnergyInductiveTariff2, 5, "Wh", ENERGY, true),
    Reg::new(ReactiveEnergyCapacitiveTariff1, 6, "Wh", ENERGY, true),
    Reg::new(ReactiveEnergyCapacitiveTariff2, 7, "Wh", ENERGY, true),
    Reg::new(ActivePowerPhase1, 8, "W", POWER_VS, true),
    Reg::new(ActivePowerPhase2, 9, "W", POWER_VS, true),
    Reg::new(ActivePowerPhase3, 10, "W", POWER_VS, true),
    Reg::new(ActivePowerAllPhases, 11, "W", POWER, true),
    Reg::new(ReactivePowerPhase1, 12, "W", POWER_VS, true),
    Reg::new(ReactivePowerPhase2, 13, "W", POWER_VS, true),
    Reg::new(ReactivePowerPhase3, 14, "W", POWER_VS, true),
    Reg::new(ReactivePowerAllPhases, 15, "W", POWER, true),
    Reg::new(ApparentPowerAllPhases, 16, "W", POWER, true),
    Reg::new(VoltagePhase1, 17, "V", VOLTS_VS, true),
    Reg::new(VoltagePhase2, 18, "V", VOLTS_VS, true),
    Reg::new(VoltagePhase3, 19, "V", VOLTS_VS, true),
    Reg::new(CurrentPhase1, 20, "A", AMPERE_VS, true),
    Reg::new(CurrentPhase2, 21, "A", AMPERE_VS, true),
    Reg::new(CurrentPhase3, 22, "A", AMPERE_VS, true),
    Reg::new(CurrentAllPhases, 23, "A", AMPERE, true),
    Reg::new(FormFactorPhase1, 24, NO_UNIT, SUPPLIER, false),
    Reg::new(FormFactorPhase2, 25, NO_UNIT, SUPPLIER, false),
    Reg::new(FormFactorPhase3, 26, NO_UNIT, SUPPLIER, false),
    Reg::new(Frequency, 27, NO_UNIT, SUPPLIER, true),
    Reg::new(PowerFailures, 28, NO_UNIT, RESET_COUNTER, false),
    Reg::new(CurrentTransformerFactor, 29, NO_UNIT, SUPPLIER, true),
    Reg::new(ErrorFlags, 30, "Bin", ERROR_FLAGS, false),
];

// Positions 16..=21 carry values nobody has identified yet.
const PROFESSIONAL_V16_32VAL: [Reg; 26] = [
    Reg::new(SerialNo, 0, NO_UNIT, None, false),
    Reg::new(ActiveEnergyImportTariff1, 1, "Wh", ENERGY, true),
    Reg::new(ActiveEnergyImportTariff2, 2, "Wh", ENERGY, true),
    Reg::new(ReactiveEnergyInductiveTariff1, 3, "Wh", ENERGY, true),
    Reg::new(ReactiveEnergyInductiveTariff2, 4, "Wh", ENERGY, true),
    Reg::new(ActivePowerPhase1, 5, "W", POWER_VS, true),
    Reg::new(ActivePowerPhase2, 6, "W", POWER_VS, true),
    Reg::new(ActivePowerPhase3, 7, "W", POWER_VS, true),
    Reg::new(ActivePowerAllPhases, 8, "W", POWER, true),
    Reg::new(ReactivePowerPhase1, 9, "W", POWER_VS, true),
    Reg::new(ReactivePowerPhase2, 10, "W", POWER_VS, true),
    Reg::new(ReactivePowerPhase3, 11, "W", POWER_VS, true),
    Reg::new(ReactivePowerAllPhases, 12, "W", POWER, true),
    Reg::new(VoltagePhase1, 13, "V", VOLTS_VS, true),
    Reg::new(VoltagePhase2, 14, "V", VOLTS_VS, true),
    Reg::new(VoltagePhase3, 15, "V", VOLTS_VS, true),
    Reg::new(CurrentPhase1, 22, "A", AMPERE_VS, true),
    Reg::new(CurrentPhase2, 23, "A", AMPERE_VS, true),
    Reg::new(CurrentPhase3, 24, "A", AMPERE_VS, true),
    Reg::new(CurrentAllPhases, 25, "A", AMPERE, true),
    Reg::new(FormFactorPhase1, 26, NO_UNIT, SUPPLIER, true),
    Reg::new(FormFactorPhase2, 27, NO_UNIT, SUPPLIER, true),
    Reg::new(FormFactorPhase3, 28, NO_UNIT, SUPPLIER, true),
    Reg::new(Frequency, 29, "Hz", SUPPLIER, true),
    Reg::new(PowerFailures, 30, NO_UNIT, RESET_COUNTER, true),
    Reg::new(ErrorFlags, 31, "Bin", ERROR_FLAGS, false),
];

const PROFESSIONAL_V25_24VAL: [Reg; 24] = [
    Reg::new(ActiveEnergyImportTariff1, 0, "Wh", ENERGY, true),
    Reg::new(ActiveEnergyImportTariff2, 1, "Wh", ENERGY, true),
    Reg::new(ActiveEnergyExportTariff1, 2, "Wh", ENERGY, true),
    Reg::new(ActiveEnergyExportTariff2, 3, "Wh", ENERGY, true),
    Reg::new(ReactiveEnergyInductiveTariff1, 4, "Wh", ENERGY, true),
    Reg::new(ReactiveEnergyInductiveTariff2, 5, "Wh", ENERGY, true),
    Reg::new(ReactiveEnergyCapacitiveTariff1, 6, "Wh", ENERGY, true),
    Reg::new(ReactiveEnergyCapacitiveTariff2, 7, "Wh", ENERGY, true),
    Reg::new(ActivePowerAllPhases, 8, "W", POWER, true),
    Reg::new(ActivePowerPhase1, 9, "W", POWER_VS, true),
    Reg::new(ActivePowerPhase2, 10, "W", POWER_VS, true),
    Reg::new(ActivePowerPhase3, 11, "W", POWER_VS, true),
    Reg::new(CurrentAllPhases, 12, "A", AMPERE, true),
    Reg::new(CurrentPhase1, 13, "A", AMPERE_VS, true),
    Reg::new(CurrentPhase2, 14, "A", AMPERE_VS, true),
    Reg::new(CurrentPhase3, 15, "A", AMPERE_VS, true),
    Reg::new(VoltagePhase1, 16, "V", VOLTS_VS, true),
    Reg::new(VoltagePhase2, 17, "V", VOLTS_VS, true),
    Reg::new(VoltagePhase3, 18, "V", VOLTS_VS, true),
    Reg::new(FormFactorPhase1, 19, NO_UNIT, SUPPLIER, false),
    Reg::new(FormFactorPhase2, 20, NO_UNIT, SUPPLIER, false),
    Reg::new(FormFactorPhase3, 21, NO_UNIT, SUPPLIER, false),
    Reg::new(Frequency, 22, NO_UNIT, SUPPLIER, false),
    Reg::new(PowerFailures, 23, NO_UNIT, RESET_COUNTER, true),
];

const GWF_WATER_2VAL: [Reg; 2] = [
    Reg::new(SerialNo, 0, NO_UNIT, Some("Fabrication"), false),
    Reg::new(Volume, 1, VOLUME_UNIT, Some("Volume"), false),
];

/// Every template the bridge knows, keyed by `(firmware_version, register_count)`.
pub static TEMPLATES: [DeviceTemplate; 7] = [
    DeviceTemplate {
        id: TemplateId::Emu140V4Values15,
        firmware_version: 4,
        register_count: 15,
        model_name: "1/40",
        manufacturer_name: "EMU",
        registers: &EMU_1_40_V4_15VAL,
    },
    DeviceTemplate {
        id: TemplateId::AllrounderV16Values15,
        firmware_version: 16,
        register_count: 15,
        model_name: "Allrounder 3/75",
        manufacturer_name: "EMU",
        registers: &ALLROUNDER_V16_15VAL,
    },
    DeviceTemplate {
        id: TemplateId::AllrounderV16Values17,
        firmware_version: 16,
        register_count: 17,
        model_name: "Allrounder 3/75",
        manufacturer_name: "EMU",
        registers: &ALLROUNDER_V16_17VAL,
    },
    DeviceTemplate {
        id: TemplateId::ProfessionalV16Values31,
        firmware_version: 16,
        register_count: 31,
        model_name: "Professional 3/75",
        manufacturer_name: "EMU",
        registers: &PROFESSIONAL_V16_31VAL,
    },
    DeviceTemplate {
        id: TemplateId::ProfessionalV16Values32,
        firmware_version: 16,
        register_count: 32,
        model_name: "Professional II 3/100",
        manufacturer_name: "EMU",
        registers: &PROFESSIONAL_V16_32VAL,
    },
    DeviceTemplate {
        id: TemplateId::ProfessionalV25Values24,
        firmware_version: 25,
        register_count: 24,
        model_name: "Professional II 3/100",
        manufacturer_name: "EMU",
        registers: &PROFESSIONAL_V25_24VAL,
    },
    DeviceTemplate {
        id: TemplateId::GwfWaterValues2,
        firmware_version: 60,
        register_count: 2,
        model_name: "Water",
        manufacturer_name: "GWF",
        registers: &GWF_WATER_2VAL,
    },
];

/// Looks up the template for a meter's firmware version and register count.
pub fn resolve(firmware_version: u32, register_count: usize) -> Option<&'static DeviceTemplate> {
    TEMPLATES
        .iter()
        .find(|t| t.key() == (firmware_version, register_count))
}

/// Template for a persisted identifier.
pub fn template(id: TemplateId) -> Option<&'static DeviceTemplate> {
    TEMPLATES.iter().find(|t| t.id == id)
}

/// Verifies the table is internally consistent. Called once at startup; a failure
/// here is a programming error, not a runtime condition.
pub fn check_registry() -> Result<(), RegistryError> {
    for (i, first) in TEMPLATES.iter().enumerate() {
        if let Some(second) = TEMPLATES[i + 1..].iter().find(|t| t.key() == first.key()) {
            return Err(RegistryError::DuplicateKey {
                first: first.id.as_str(),
                second: second.id.as_str(),
                version: first.firmware_version,
                register_count: first.register_count,
            });
        }

        if let Some(reg) = first
            .registers
            .iter()
            .find(|r| r.position as usize >= first.register_count)
        {
            return Err(RegistryError::PositionOutOfRange {
                template: first.id.as_str(),
                name: reg.name,
                position: reg.position,
                register_count: first.register_count,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_is_consistent() {
        check_registry().unwrap();
    }

    #[test]
    fn test_every_template_id_has_a_template() {
        for id in TemplateId::ALL {
            let t = template(id).unwrap();
            assert_eq!(t.id, id);
        }
    }

    #[test]
    fn test_resolve_known_keys() {
        assert_eq!(resolve(4, 15).unwrap().id, TemplateId::Emu140V4Values15);
        assert_eq!(resolve(16, 15).unwrap().id, TemplateId::AllrounderV16Values15);
        assert_eq!(resolve(16, 17).unwrap().id, TemplateId::AllrounderV16Values17);
        assert_eq!(resolve(16, 31).unwrap().id, TemplateId::ProfessionalV16Values31);
        assert_eq!(resolve(16, 32).unwrap().id, TemplateId::ProfessionalV16Values32);
        assert_eq!(resolve(25, 24).unwrap().id, TemplateId::ProfessionalV25Values24);
        assert_eq!(resolve(60, 2).unwrap().id, TemplateId::GwfWaterValues2);
    }

    #[test]
    fn test_resolve_is_exact() {
        assert!(resolve(99, 99).is_none());
        assert!(resolve(16, 16).is_none());
        assert!(resolve(4, 17).is_none());
        assert!(resolve(60, 3).is_none());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        for t in TEMPLATES.iter() {
            let (version, count) = t.key();
            let first = resolve(version, count).unwrap();
            let second = resolve(version, count).unwrap();
            assert!(std::ptr::eq(first, second));
            assert!(std::ptr::eq(first, t));
        }
    }

    #[test]
    fn test_register_names_unique_within_template() {
        for t in TEMPLATES.iter() {
            let names: HashSet<_> = t.registers.iter().map(|r| r.name).collect();
            assert_eq!(names.len(), t.registers.len(), "{}", t.id);

            let positions: HashSet<_> = t.registers.iter().map(|r| r.position).collect();
            assert_eq!(positions.len(), t.registers.len(), "{}", t.id);
        }
    }
}
