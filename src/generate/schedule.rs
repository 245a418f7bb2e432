use chrono::NaiveTime;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::error::{MirrorError, MirrorResult};
use crate::schema::{EntityKind, Term};
use crate::store::FactStore;

/// Lecture occurrences every group gets in every term
pub const SCHEDULES_PER_TERM: usize = 5;

/// First and last-plus-one starting hour of a lecture
const FIRST_HOUR: u32 = 9;
const END_HOUR: u32 = 15;

/// Give every group `SCHEDULES_PER_TERM` lectures on distinct working days of
/// each term. Returns the number of schedule rows created.
pub fn generate_schedule<R: Rng>(
    store: &FactStore,
    terms: &[Term],
    rng: &mut R,
) -> MirrorResult<u64> {
    let groups = store.ids(EntityKind::Group)?;
    let lectures = store.ids(EntityKind::Lecture)?;
    if lectures.is_empty() && !groups.is_empty() {
        return Err(MirrorError::config("cannot schedule groups without lectures"));
    }

    let mut created = 0;
    for term in terms {
        let semester = term.semester()?;
        let working_days = term.working_days();
        if working_days.len() < SCHEDULES_PER_TERM {
            return Err(MirrorError::InvalidTerm {
                name: term.name.clone(),
                reason: format!(
                    "only {} working days, {} needed",
                    working_days.len(),
                    SCHEDULES_PER_TERM
                ),
            });
        }

        for &group_id in &groups {
            let mut days: Vec<_> = working_days
                .choose_multiple(rng, SCHEDULES_PER_TERM)
                .copied()
                .collect();
            days.sort();

            for day in days {
                let time = NaiveTime::from_hms_opt(
                    rng.gen_range(FIRST_HOUR..END_HOUR),
                    rng.gen_range(0..60),
                    0,
                )
                .ok_or_else(|| MirrorError::config("lecture time out of range"))?;
                let lecture_id = *lectures
                    .choose(rng)
                    .ok_or_else(|| MirrorError::config("no lectures to schedule"))?;

                store.insert_schedule(day.and_time(time), lecture_id, group_id)?;
                created += 1;
            }
        }

        debug!(term = %term.name, semester = %semester, groups = groups.len(), "term scheduled");
    }

    Ok(created)
}
