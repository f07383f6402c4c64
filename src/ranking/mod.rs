/// 입찰 순위 규칙
/// 금액 내림차순, 시각 오름차순의 전순서. 같은 시각의 입찰은 저장소가 부여한
/// id 오름차순으로 구분한다 (공개 순서는 금액/시각까지만).
// region:    --- Imports
use crate::auction::model::Bid;
use std::cmp::Ordering;

// endregion: --- Imports

// region:    --- Ranking

/// 두 입찰 비교
pub fn compare(a: &Bid, b: &Bid) -> Ordering {
    b.amount
        .cmp(&a.amount)
        .then_with(|| a.bid_timestamp.cmp(&b.bid_timestamp))
        .then_with(|| a.id.cmp(&b.id))
}

/// 입찰 목록을 순위 규칙에 따라 정렬
pub fn rank(bids: &mut [Bid]) {
    bids.sort_by(compare);
}

/// 상위 N 낙찰자와 나머지 분리
pub fn split_winners(mut bids: Vec<Bid>, total_items: i64) -> (Vec<Bid>, Vec<Bid>) {
    rank(&mut bids);
    let n = (total_items.max(0) as usize).min(bids.len());
    let losers = bids.split_off(n);
    (bids, losers)
}

/// 최소 입찰가: ceil(최고가 × (100 + 상승률) / 100)
pub fn min_required(top_amount: i64, step_percent: i64) -> i64 {
    let numerator = top_amount as i128 * (100 + step_percent) as i128;
    ((numerator + 99) / 100) as i64
}

// endregion: --- Ranking

// region:    --- Tests


// endregion: --- Tests
