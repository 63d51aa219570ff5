use super::{columns, BindValue, BoundQuery, LookbackWindow};
use serde::{Deserialize, Serialize};

/// Fully-qualified warehouse objects the templates read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseTables {
    /// Per-search SQI scores, keyed by query_id.
    pub sqi_results: String,
    /// Raw search-event log.
    pub searches: String,
    pub accounts: String,
    /// Monthly SQI averages per (business, experience).
    pub monthly_experience_sqi: String,
    pub api_keys: String,
}

impl Default for WarehouseTables {
    fn default() -> Self {
        Self {
            sqi_results: "prod_data_science.public.agg_sqi_v2_results".to_string(),
            searches: "prod_data_hub.answers.searches".to_string(),
            accounts: "prod_product.public.yext_accounts".to_string(),
            monthly_experience_sqi: "prod_data_science.public.agg_sqi_v2_by_experience".to_string(),
            api_keys: "prod_product.public.search_api_keys".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    tables: WarehouseTables,
}

impl QueryBuilder {
    pub fn new(tables: WarehouseTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &WarehouseTables {
        &self.tables
    }

    /// Per-query SQI for one experience over the lookback window, busiest
    /// queries first.
    ///
    /// `business_name` and `experience_key` are bound, not escaped; callers
    /// take them from the catalog.
    pub fn build_query_sql(
        &self,
        business_name: &str,
        experience_key: &str,
        lookback: LookbackWindow,
    ) -> BoundQuery {
        let t = &self.tables;
        let sql = format!(
            "select
    s.tokenizer_normalized_query as {query},
    a.business_id as {business_id},
    a.business_name as {business_name},
    s.experience_key as {experience_key},
    m.sqi as {experience_avg},
    avg(r.sqi) as {query_sqi},
    count(s.tokenizer_normalized_query) as {total_searches},
    case
        when round(avg(r.sqi), 2) < round(m.sqi, 2) then 'Below Average'
        when round(avg(r.sqi), 2) = round(m.sqi, 2) then 'Average'
        else 'Above Average'
    end as {performance}
from {sqi_results} as r
join {searches} as s on r.query_id = s.query_id
join {accounts} as a on s.business_id = a.business_id
join {monthly} as m
    on a.business_id = m.business_id
    and s.experience_key = m.experience_key
    and year(s.timestamp) = m.year
    and month(s.timestamp) = m.month
where to_date(s.timestamp) >= dateadd('day', ?, current_date())
    and a.business_name = ?
    and s.experience_key = ?
group by 1, 2, 3, 4, 5
order by {total_searches} desc",
            query = columns::QUERY,
            business_id = columns::BUSINESS_ID,
            business_name = columns::BUSINESS_NAME,
            experience_key = columns::EXPERIENCE_KEY,
            experience_avg = columns::EXPERIENCE_AVG_SQI,
            query_sqi = columns::QUERY_SQI_SCORE,
            total_searches = columns::TOTAL_SEARCHES,
            performance = columns::PERFORMANCE,
            sqi_results = t.sqi_results,
            searches = t.searches,
            accounts = t.accounts,
            monthly = t.monthly_experience_sqi,
        );

        BoundQuery::new(
            sql,
            vec![
                lookback_offset(lookback),
                BindValue::Text(business_name.to_string()),
                BindValue::Text(experience_key.to_string()),
            ],
        )
    }

    /// Warehouse-wide average SQI over the same window.
    pub fn build_global_query_sql(&self, lookback: LookbackWindow) -> BoundQuery {
        let t = &self.tables;
        let sql = format!(
            "select
    avg(r.sqi) as {query_sqi}
from {sqi_results} as r
join {searches} as s on r.query_id = s.query_id
where to_date(s.timestamp) >= dateadd('day', ?, current_date())",
            query_sqi = columns::QUERY_SQI_SCORE,
            sqi_results = t.sqi_results,
            searches = t.searches,
        );

        BoundQuery::new(sql, vec![lookback_offset(lookback)])
    }

    /// Search API key registered for a business.
    pub fn build_api_key_query(&self, business_id: &str) -> BoundQuery {
        let sql = format!(
            "select {api_key}
from {api_keys}
where business_id = ?
limit 1",
            api_key = columns::API_KEY,
            api_keys = self.tables.api_keys,
        );

        BoundQuery::new(sql, vec![BindValue::Text(business_id.to_string())])
    }
}

fn lookback_offset(lookback: LookbackWindow) -> BindValue {
    BindValue::Integer(-i64::from(lookback.days()))
}
