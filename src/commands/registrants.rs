use anyhow::{bail, Context, Result};

use slotwatch::config::Config;
use slotwatch::models::{ApplicationType, Citizenship, NewRegistrant};
use slotwatch::storage::{create_sqlite_store, SharedRegistrantStore};

fn open_store(config: &Config) -> Result<SharedRegistrantStore> {
    create_sqlite_store(&config.store.sqlite_path).with_context(|| {
        format!(
            "Failed to open registrant store at {}",
            config.store.sqlite_path.display()
        )
    })
}

/// Fields for `registrants add`
#[derive(Debug, Clone)]
pub struct AddParams {
    pub name: String,
    pub surname: String,
    pub citizenship: String,
    pub email: String,
    pub phone: String,
    pub application_type: String,
    pub month: u32,
}

fn parse_citizenship(value: &str) -> Result<Citizenship> {
    Citizenship::parse(value).with_context(|| {
        let known: Vec<&str> = Citizenship::all().iter().map(|c| c.as_str()).collect();
        format!("Unknown citizenship '{value}'. Valid: {}", known.join(", "))
    })
}

fn parse_application_type(value: &str) -> Result<ApplicationType> {
    ApplicationType::parse(value).with_context(|| {
        let known: Vec<&str> = ApplicationType::all().iter().map(|t| t.as_str()).collect();
        format!("Unknown application type '{value}'. Valid: {}", known.join(", "))
    })
}

pub async fn add(config: Config, params: AddParams) -> Result<()> {
    let store = open_store(&config)?;

    let intake = NewRegistrant {
        name: params.name,
        surname: params.surname,
        citizenship: parse_citizenship(&params.citizenship)?,
        email: params.email,
        phone: params.phone,
        application_type: parse_application_type(&params.application_type)?,
        desired_month: params.month,
    };

    let registrant = store.add(intake).await?;
    println!(
        "Added registrant #{}: {} <{}> for month {}",
        registrant.id,
        registrant.full_name(),
        registrant.email,
        registrant.desired_month
    );
    Ok(())
}

pub async fn list(config: Config, month: Option<u32>, all: bool) -> Result<()> {
    if let Some(m) = month {
        if !(1..=12).contains(&m) {
            bail!("month must be between 1 and 12");
        }
    }

    let store = open_store(&config)?;
    let registrants = if all {
        let mut all = store.list_all().await?;
        if let Some(m) = month {
            all.retain(|r| r.desired_month == m);
        }
        all
    } else {
        store.list_pending(month).await?
    };

    if registrants.is_empty() {
        println!("No registrants");
        return Ok(());
    }

    println!(
        "{:>5}  {:<28} {:<30} {:>5}  {:<10} {}",
        "ID", "NAME", "EMAIL", "MONTH", "CITIZEN", "RESERVATION"
    );
    for r in &registrants {
        println!(
            "{:>5}  {:<28} {:<30} {:>5}  {:<10} {}",
            r.id,
            r.full_name(),
            r.email,
            r.desired_month,
            r.citizenship.as_str(),
            r.reservation_id.as_deref().unwrap_or("-")
        );
    }
    println!("{} registrant(s)", registrants.len());
    Ok(())
}

pub async fn stats(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let stats = store.statistics().await?;

    println!("Registrant Statistics");
    println!("=====================");
    println!("  Total:    {}", stats.total);
    println!("  Reserved: {}", stats.reserved);
    println!("  Pending:  {}", stats.pending);

    if !stats.by_month.is_empty() {
        println!("\n  Pending by month:");
        for (month, count) in &stats.by_month {
            println!("    {month:>2}: {count}");
        }
    }
    if !stats.by_citizenship.is_empty() {
        println!("\n  By citizenship:");
        for (citizenship, count) in &stats.by_citizenship {
            println!("    {citizenship:<10} {count}");
        }
    }
    Ok(())
}

pub async fn delete(config: Config, id: i64) -> Result<()> {
    let store = open_store(&config)?;
    if store.delete(id).await? {
        println!("Deleted registrant #{id}");
        Ok(())
    } else {
        bail!("Registrant #{id} not found")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enums() {
        assert_eq!(parse_citizenship("ukraine").unwrap(), Citizenship::Ukraine);
        assert!(parse_citizenship("atlantis").is_err());
        assert_eq!(parse_application_type("adult").unwrap(), ApplicationType::Adult);
    }

    #[tokio::test]
    async fn test_add_and_delete_against_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.sqlite_path = dir.path().join("registrants.db");

        add(
            config.clone(),
            AddParams {
                name: "Anna".into(),
                surname: "Kowalska".into(),
                citizenship: "belarus".into(),
                email: "Anna@Example.com".into(),
                phone: "48123456789".into(),
                application_type: "adult".into(),
                month: 8,
            },
        )
        .await
        .unwrap();

        let store = open_store(&config).unwrap();
        let pending = store.list_pending(Some(8)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].email, "anna@example.com");

        delete(config.clone(), pending[0].id).await.unwrap();
        assert!(delete(config, pending[0].id).await.is_err());
    }
}
