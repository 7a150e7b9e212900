// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Contract interfaces for the NFT collection.

alloy::sol! {
    /// The subset of ERC-721 (plus the enumerable `totalSupply`) read by a run.
    #[sol(rpc, all_derives)]
    interface IERC721 {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        function ownerOf(uint256 tokenId) external view returns (address);

        function totalSupply() external view returns (uint256);
    }
}
