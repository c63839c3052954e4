//! # Seed Subcommand
//!
//! Adds demo personnel (equal numbers of `L` and `P`) and leave records.
//! Generation is driven by a seeded [`SplitMix64`], so the same `--seed`
//! against the same database yields the same data. Every generated record
//! passes [`cuti_core::quota::validate_request`] against everything already
//! planned or stored, and is written through the quota-checked insert.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use clap::Args;
use rand_core::{impls, Error as RngError, RngCore};
use sqlx::PgPool;
use uuid::Uuid;

use cuti_core::quota::validate_request;
use cuti_core::{Gender, LeaveRecord, LeaveRequest, LeaveType, Personnel};

/// Arguments for `cuti seed`.
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Personnel to add per gender.
    #[arg(long, default_value_t = 10)]
    pub per_gender: usize,

    /// Leave records to attempt per added person.
    #[arg(long, default_value_t = 3)]
    pub leaves_per_person: usize,

    /// Year the demo leave falls in (defaults to the current year).
    #[arg(long)]
    pub year: Option<i32>,

    /// Generator seed.
    #[arg(long, default_value_t = 2024)]
    pub seed: u64,
}

// ─── Deterministic generator ────────────────────────────────────────────────

/// SplitMix64: small, fast and fully reproducible from its seed.
#[derive(Debug, Clone)]
pub struct SplitMix64(u64);

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Uniform-enough index in `0..n` for demo data.
    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.below(items.len())]
    }
}

impl RngCore for SplitMix64 {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), RngError> {
        self.fill_bytes(dest);
        Ok(())
    }
}

// ─── Demo vocabulary ────────────────────────────────────────────────────────

const MALE_NAMES: &[&str] = &[
    "Agus", "Bambang", "Dedi", "Eko", "Hendra", "Joko", "Rudi", "Slamet", "Teguh", "Wahyu",
];
const FEMALE_NAMES: &[&str] = &[
    "Ayu", "Dewi", "Fitri", "Indah", "Lestari", "Nur", "Putri", "Rina", "Sari", "Wulan",
];
const SURNAMES: &[&str] = &[
    "Santoso", "Wibowo", "Saputra", "Hidayat", "Kurniawan", "Pratama", "Setiawan", "Nugroho",
    "Permata", "Rahayu",
];
const RANKS: &[&str] = &[
    "BRIPDA", "BRIPTU", "BRIGPOL", "BRIPKA", "AIPDA", "AIPTU", "IPDA", "IPTU", "AKP",
];
const POSITIONS: &[&str] = &[
    "BA SIUM", "BA SPKT", "BAMIN", "PAUR SUBBAG", "KANIT", "BA SAT LANTAS", "BA SAT RESKRIM",
];
const DEPARTMENTS: &[&str] = &["SIUM", "SPKT", "SAT LANTAS", "SAT RESKRIM", "BAG SDM"];
const REASONS: &[&str] = &[
    "Keperluan keluarga",
    "Acara pernikahan saudara",
    "Pemeriksaan kesehatan",
    "Pulang kampung",
    "Ibadah keagamaan",
    "Pindah rumah",
];

/// Upper bound on days per generated record.
const MAX_DEMO_DAYS: i32 = 5;

// ─── Planning ───────────────────────────────────────────────────────────────

/// Demo personnel whose `nrp` does not collide with `taken`.
pub fn generate_personnel(
    rng: &mut SplitMix64,
    per_gender: usize,
    taken: impl Fn(&str) -> bool,
) -> Vec<Personnel> {
    let now = Utc::now();
    let mut out: Vec<Personnel> = Vec::with_capacity(per_gender * 2);
    for gender in [Gender::Male, Gender::Female] {
        let first_names = match gender {
            Gender::Male => MALE_NAMES,
            Gender::Female => FEMALE_NAMES,
        };
        let mut added = 0;
        while added < per_gender {
            // Birth year and month prefix, as real service numbers carry.
            let nrp = format!(
                "{:02}{:02}{:04}",
                70 + rng.below(30),
                1 + rng.below(12),
                rng.below(10_000)
            );
            if taken(&nrp) || out.iter().any(|p| p.nrp == nrp) {
                continue;
            }
            out.push(Personnel {
                id: Uuid::new_v4(),
                nrp,
                name: format!("{} {}", rng.pick(first_names), rng.pick(SURNAMES)),
                rank: rng.pick(RANKS).to_string(),
                position: rng.pick(POSITIONS).to_string(),
                department: Some(rng.pick(DEPARTMENTS).to_string()),
                gender: Some(gender),
                created_at: now,
            });
            added += 1;
        }
    }
    out
}

/// Leave records for `personnel` in `year` that fit every quota, given the
/// `existing` records.
///
/// Attempts that find no applicable type with balance left are dropped.
pub fn plan_leaves(
    rng: &mut SplitMix64,
    personnel: &[Personnel],
    leave_types: &[LeaveType],
    existing: &[LeaveRecord],
    year: i32,
    per_person: usize,
) -> Vec<LeaveRecord> {
    let mut planned: Vec<LeaveRecord> = Vec::new();
    let days_in_year = if NaiveDate::from_ymd_opt(year, 2, 29).is_some() { 366 } else { 365 };

    for person in personnel {
        let usable: Vec<&LeaveType> = leave_types
            .iter()
            .filter(|lt| lt.is_active && lt.applies_to(person.gender))
            .collect();
        if usable.is_empty() {
            continue;
        }
        for _ in 0..per_person {
            let leave_type = *rng.pick(&usable);
            let Some(start_date) = NaiveDate::from_yo_opt(year, 1 + rng.below(days_in_year) as u32)
            else {
                continue;
            };
            let days_requested = 1 + rng.below(MAX_DEMO_DAYS as usize) as i32;
            let request = LeaveRequest {
                days_requested: days_requested.min(leave_type.default_quota.max(1)),
                start_date,
                editing: None,
            };
            let Ok(acceptance) = validate_request(
                person,
                leave_type,
                &request,
                existing.iter().chain(planned.iter()),
            ) else {
                continue;
            };
            planned.push(LeaveRecord {
                id: Uuid::new_v4(),
                personnel_id: person.id,
                leave_type_id: leave_type.id,
                days_requested: request.days_requested,
                start_date,
                reason: rng.pick(REASONS).to_string(),
                evidence_path: None,
                balance_remaining: acceptance.balance_remaining,
                created_at: Utc::now(),
                created_by: None,
            });
        }
    }
    planned
}

// ─── Execution ──────────────────────────────────────────────────────────────

/// Execute `cuti seed`.
pub async fn run_seed(pool: &PgPool, args: &SeedArgs) -> Result<u8> {
    let state = crate::load_state(pool).await?;
    if state.leave_types.is_empty() {
        bail!("no leave types found; run `cuti init` first");
    }
    let year = args.year.unwrap_or_else(|| Utc::now().year());
    let mut rng = SplitMix64::new(args.seed);

    let personnel = generate_personnel(&mut rng, args.per_gender, |nrp| {
        state.personnel_by_nrp(nrp).is_some()
    });
    for person in &personnel {
        cuti_api::db::personnel::insert(pool, person)
            .await
            .with_context(|| format!("failed to insert personnel {}", person.nrp))?;
        state.personnel.insert(person.id, person.clone());
    }

    let mut leave_types = state.leave_types.list();
    leave_types.sort_by(|a, b| a.code.cmp(&b.code));
    let records = plan_leaves(
        &mut rng,
        &personnel,
        &leave_types,
        &state.leave_records.list(),
        year,
        args.leaves_per_person,
    );
    for record in &records {
        let quota = leave_types
            .iter()
            .find(|lt| lt.id == record.leave_type_id)
            .map(|lt| lt.default_quota)
            .unwrap_or_default();
        cuti_api::db::leave_records::insert_checked(pool, record, quota)
            .await
            .context("failed to insert leave record")?;
    }

    tracing::info!(personnel = personnel.len(), records = records.len(), year, "demo data seeded");
    println!(
        "Added {} personnel and {} leave records for {year}.",
        personnel.len(),
        records.len()
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuti_core::quota::used_days;
    use cuti_core::registry::default_leave_types;
    use cuti_core::QuotaKey;

    fn types() -> Vec<LeaveType> {
        default_leave_types()
            .iter()
            .map(|s| LeaveType {
                id: Uuid::new_v4(),
                name: s.name.to_string(),
                code: s.code.to_string(),
                default_quota: s.default_quota,
                gender_specific: s.gender_specific,
                color: s.color.to_string(),
                is_active: true,
                created_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn generator_is_reproducible() {
        let mut a = SplitMix64::new(7);
        let mut b = SplitMix64::new(7);
        let xs: Vec<u64> = (0..5).map(|_| a.next_u64()).collect();
        let ys: Vec<u64> = (0..5).map(|_| b.next_u64()).collect();
        assert_eq!(xs, ys);
        assert_ne!(SplitMix64::new(8).next_u64(), xs[0]);
    }

    #[test]
    fn personnel_split_by_gender_with_unique_nrp() {
        let mut rng = SplitMix64::new(1);
        let people = generate_personnel(&mut rng, 10, |_| false);
        assert_eq!(people.len(), 20);
        assert_eq!(people.iter().filter(|p| p.gender == Some(Gender::Male)).count(), 10);
        let mut nrps: Vec<&str> = people.iter().map(|p| p.nrp.as_str()).collect();
        nrps.sort_unstable();
        nrps.dedup();
        assert_eq!(nrps.len(), 20);
        assert!(people.iter().all(|p| p.nrp.len() == 8));
    }

    #[test]
    fn same_seed_same_roster() {
        let names = |seed| {
            generate_personnel(&mut SplitMix64::new(seed), 3, |_| false)
                .into_iter()
                .map(|p| (p.nrp, p.name))
                .collect::<Vec<_>>()
        };
        assert_eq!(names(42), names(42));
    }

    #[test]
    fn planned_leave_respects_quota_and_gender() {
        let mut rng = SplitMix64::new(99);
        let people = generate_personnel(&mut rng, 5, |_| false);
        let types = types();
        let records = plan_leaves(&mut rng, &people, &types, &[], 2025, 40);
        assert!(!records.is_empty());

        for person in &people {
            for lt in &types {
                let used = used_days(&records, QuotaKey::new(person.id, lt.id, 2025), None);
                assert!(used <= lt.default_quota, "{} overdrawn", lt.code);
                if used > 0 {
                    assert!(lt.applies_to(person.gender));
                }
            }
        }
        assert!(records.iter().all(|r| r.start_date.year() == 2025));
        assert!(records.iter().all(|r| r.balance_remaining >= 0));
    }
}
