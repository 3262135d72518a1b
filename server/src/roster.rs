use kernel::{ContractKind, ImportReport, OfferRow, PrincipalRow, Role, RowError};
use regex::Regex;

use crate::error::ServiceError;

/// Fixed column headers of the user import sheet. The exact French strings
/// are the wire contract; sheets produced by export round-trip through
/// import unchanged.
pub const USER_HEADERS: [&str; 5] = ["Prénom", "Nom", "Email", "Mot de passe", "Rôle"];

/// Fixed column headers of the job-offer import sheet.
pub const OFFER_HEADERS: [&str; 4] = ["Titre", "Entreprise", "Ville", "Type de contrat"];

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$";

fn email_regex() -> Regex {
    #[allow(clippy::unwrap_used)] // the pattern is a compile-time constant
    Regex::new(EMAIL_PATTERN).unwrap()
}

/// Password policy: at least 8 characters with an upper-case letter, a
/// lower-case letter and a digit.
fn password_is_strong(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(char::is_uppercase)
        && password.chars().any(char::is_lowercase)
        && password.chars().any(|c| c.is_ascii_digit())
}

fn check_headers(found: &csv::StringRecord, expected: &[&str]) -> Result<(), ServiceError> {
    let found: Vec<&str> = found.iter().map(str::trim).collect();
    if found != expected {
        return Err(ServiceError::validation(format!(
            "expected headers {expected:?}, found {found:?}"
        )));
    }
    Ok(())
}

fn field<'a>(record: &'a csv::StringRecord, index: usize) -> &'a str {
    record.get(index).unwrap_or_default().trim()
}

/// Parses the user sheet. Every malformed row is excluded from the valid set
/// and contributes exactly one message citing its spreadsheet line number
/// (the header is line 1, the first data row line 2).
pub fn parse_users(data: &[u8]) -> Result<(Vec<PrincipalRow>, Vec<RowError>), ServiceError> {
    let mut reader = csv::Reader::from_reader(data);
    let headers = reader
        .headers()
        .map_err(|e| ServiceError::validation(format!("unreadable sheet: {e}")))?
        .clone();
    check_headers(&headers, &USER_HEADERS)?;

    let email = email_regex();
    let mut valid = Vec::new();
    let mut errors = Vec::new();

    for (index, record) in reader.records().enumerate() {
        let row = index + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                errors.push(RowError {
                    row,
                    message: format!("ligne {row}: enregistrement illisible ({e})"),
                });
                continue;
            }
        };

        let first_name = field(&record, 0);
        let last_name = field(&record, 1);
        let address = field(&record, 2);
        let password = field(&record, 3);
        let role = field(&record, 4);

        let problem = if first_name.is_empty()
            || last_name.is_empty()
            || address.is_empty()
            || password.is_empty()
            || role.is_empty()
        {
            Some("champ obligatoire manquant".to_owned())
        } else if !email.is_match(address) {
            Some(format!("email invalide '{address}'"))
        } else if !password_is_strong(password) {
            Some("mot de passe trop faible (8 caractères min., majuscule, minuscule, chiffre)".to_owned())
        } else if Role::parse(role).is_none() {
            Some(format!("rôle inconnu '{role}'"))
        } else {
            None
        };

        match problem {
            Some(message) => errors.push(RowError {
                row,
                message: format!("ligne {row}: {message}"),
            }),
            None => {
                // role parse re-checked above
                if let Some(role) = Role::parse(role) {
                    valid.push(PrincipalRow {
                        first_name: first_name.to_owned(),
                        last_name: last_name.to_owned(),
                        email: address.to_owned(),
                        role,
                    });
                }
            }
        }
    }

    Ok((valid, errors))
}

/// Parses the job-offer sheet with the same per-row error contract.
pub fn parse_offers(data: &[u8]) -> Result<(Vec<OfferRow>, Vec<RowError>), ServiceError> {
    let mut reader = csv::Reader::from_reader(data);
    let headers = reader
        .headers()
        .map_err(|e| ServiceError::validation(format!("unreadable sheet: {e}")))?
        .clone();
    check_headers(&headers, &OFFER_HEADERS)?;

    let mut valid = Vec::new();
    let mut errors = Vec::new();

    for (index, record) in reader.records().enumerate() {
        let row = index + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                errors.push(RowError {
                    row,
                    message: format!("ligne {row}: enregistrement illisible ({e})"),
                });
                continue;
            }
        };

        let title = field(&record, 0);
        let company = field(&record, 1);
        let city = field(&record, 2);
        let contract = field(&record, 3);

        let problem = if title.is_empty() || company.is_empty() || city.is_empty() || contract.is_empty()
        {
            Some("champ obligatoire manquant".to_owned())
        } else if ContractKind::parse(contract).is_none() {
            Some(format!("type de contrat inconnu '{contract}'"))
        } else {
            None
        };

        match problem {
            Some(message) => errors.push(RowError {
                row,
                message: format!("ligne {row}: {message}"),
            }),
            None => {
                if let Some(contract) = ContractKind::parse(contract) {
                    valid.push(OfferRow {
                        title: title.to_owned(),
                        company: company.to_owned(),
                        city: city.to_owned(),
                        contract,
                    });
                }
            }
        }
    }

    Ok((valid, errors))
}

/// Writes principals back out under the import header schema. The password
/// column is part of the contract but is emitted blank; passwords are not
/// stored in recoverable form.
pub fn write_users(principals: &[PrincipalRow]) -> Result<Vec<u8>, ServiceError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(USER_HEADERS)
        .map_err(|e| ServiceError::Metadata(format!("export not written: {e}")))?;
    for principal in principals {
        writer
            .write_record([
                principal.first_name.as_str(),
                principal.last_name.as_str(),
                principal.email.as_str(),
                "",
                &principal.role.to_string(),
            ])
            .map_err(|e| ServiceError::Metadata(format!("export not written: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| ServiceError::Metadata(format!("export not written: {e}")))
}

#[must_use]
pub fn report(imported: usize, errors: Vec<RowError>) -> ImportReport {
    ImportReport { imported, errors }
}
