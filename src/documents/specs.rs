//! Field tables for the supported document types.

use super::{DocumentSpec, DocumentType, FieldSpec};

pub static ID_CARD: DocumentSpec = DocumentSpec {
    document_type: DocumentType::IdCard,
    fields: &[
        FieldSpec::text("Name"),
        FieldSpec::text("ID Number"),
        FieldSpec::text("Race"),
        FieldSpec::date("Date of birth"),
        FieldSpec::text("Sex"),
        FieldSpec::text("Country/Place of birth"),
    ],
    aliases: &[
        ("Full Name", "Name"),
        ("NRIC", "ID Number"),
        ("NRIC No", "ID Number"),
        ("NRIC Number", "ID Number"),
        ("ID No", "ID Number"),
        ("Identity No", "ID Number"),
        ("Identity Card No", "ID Number"),
        ("DOB", "Date of birth"),
        ("Birth Date", "Date of birth"),
        ("Gender", "Sex"),
        ("Country of birth", "Country/Place of birth"),
        ("Place of birth", "Country/Place of birth"),
    ],
    markers: &["identity", "id card"],
    required_keywords: &["name", "id", "date"],
    identifier_field: "ID Number",
};

pub static DRIVERS_LICENSE: DocumentSpec = DocumentSpec {
    document_type: DocumentType::DriversLicense,
    fields: &[
        FieldSpec::text("Name"),
        FieldSpec::text("License Number"),
        FieldSpec::date("Date of birth"),
        FieldSpec::date("Issue Date"),
        FieldSpec::date("Valid From"),
        FieldSpec::date("Valid To"),
        FieldSpec::text("Classes"),
    ],
    aliases: &[
        ("Full Name", "Name"),
        ("License No", "License Number"),
        ("Licence No", "License Number"),
        ("Licence Number", "License Number"),
        ("Driving Licence No", "License Number"),
        ("DOB", "Date of birth"),
        ("Date of Issue", "Issue Date"),
        ("Issued", "Issue Date"),
        ("Expiry", "Valid To"),
        ("Expiry Date", "Valid To"),
        ("Valid Until", "Valid To"),
        ("Class", "Classes"),
        ("Licence Class", "Classes"),
        ("Class of Vehicle", "Classes"),
    ],
    markers: &["driver", "license", "licence"],
    required_keywords: &["license", "licence", "expiry", "class"],
    identifier_field: "License Number",
};

pub static LOG_CARD: DocumentSpec = DocumentSpec {
    document_type: DocumentType::LogCard,
    fields: &[
        FieldSpec::text("Vehicle No"),
        FieldSpec::text("Make/Model"),
        FieldSpec::text("Vehicle Type"),
        FieldSpec::text("Vehicle Attachment 1"),
        FieldSpec::text("Vehicle Scheme"),
        FieldSpec::text("Chassis No"),
        FieldSpec::text("Propellant"),
        FieldSpec::text("Engine No"),
        FieldSpec::text("Motor No"),
        FieldSpec::text("Engine Capacity"),
        FieldSpec::text("Power Rating"),
        FieldSpec::text("Maximum Power Output"),
        FieldSpec::weight("Maximum Laden Weight"),
        FieldSpec::weight("Unladen Weight"),
        FieldSpec::text("Year Of Manufacture"),
        FieldSpec::date("Original Registration Date"),
        FieldSpec::text("COE Category"),
        FieldSpec::money("PQP Paid"),
        FieldSpec::date("COE Expiry Date"),
        FieldSpec::date("Road Tax Expiry Date"),
        FieldSpec::date("PARF Eligibility Expiry Date"),
        FieldSpec::date("Inspection Due Date"),
        FieldSpec::date("Intended Transfer Date"),
    ],
    aliases: &[
        ("Vehicle Number", "Vehicle No"),
        ("Vehicle Registration No", "Vehicle No"),
        ("Registration No", "Vehicle No"),
        ("Make", "Make/Model"),
        ("Make & Model", "Make/Model"),
        ("Make and Model", "Make/Model"),
        ("Type", "Vehicle Type"),
        ("Attachment", "Vehicle Attachment 1"),
        ("Scheme", "Vehicle Scheme"),
        ("Chassis Number", "Chassis No"),
        ("VIN", "Chassis No"),
        ("Fuel", "Propellant"),
        ("Fuel Type", "Propellant"),
        ("Engine Number", "Engine No"),
        ("Motor Number", "Motor No"),
        ("Capacity", "Engine Capacity"),
        ("Engine CC", "Engine Capacity"),
        ("Max Power Output", "Maximum Power Output"),
        ("Max Laden Weight", "Maximum Laden Weight"),
        ("Registration Date", "Original Registration Date"),
        ("Original Reg Date", "Original Registration Date"),
        ("PQP", "PQP Paid"),
        ("PQP Amount", "PQP Paid"),
        ("COE Expiry", "COE Expiry Date"),
        ("Road Tax Expiry", "Road Tax Expiry Date"),
        ("PARF Expiry Date", "PARF Eligibility Expiry Date"),
        ("Inspection Due", "Inspection Due Date"),
        ("Transfer Date", "Intended Transfer Date"),
    ],
    markers: &["log"],
    required_keywords: &["vehicle", "registration", "owner"],
    identifier_field: "Vehicle No",
};

/// Registration order used by the default classifier.
pub static DEFAULT_REGISTRY: [&DocumentSpec; 3] = [&ID_CARD, &DRIVERS_LICENSE, &LOG_CARD];

/// The built-in spec for a document type.
pub fn spec_for(document_type: DocumentType) -> &'static DocumentSpec {
    match document_type {
        DocumentType::IdCard => &ID_CARD,
        DocumentType::DriversLicense => &DRIVERS_LICENSE,
        DocumentType::LogCard => &LOG_CARD,
    }
}
